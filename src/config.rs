//! 可调整的规则与牌库构成。

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("range `{field}` is empty ({min} > {max})")]
    EmptyRange { field: &'static str, min: i32, max: i32 },
    #[error("hero needs at least one attack per turn")]
    NoHeroAttacks,
}

/// 生成卡牌数值时使用的闭区间。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ValueRange {
    pub min: i32,
    pub max: i32,
}

impl ValueRange {
    pub const fn new(min: i32, max: i32) -> Self {
        Self { min, max }
    }

    fn check(&self, field: &'static str) -> Result<(), ConfigError> {
        if self.min > self.max {
            return Err(ConfigError::EmptyRange {
                field,
                min: self.min,
                max: self.max,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RulesConfig {
    pub base_max_hp: i32,
    pub hero_attacks_per_turn: u8,
    pub hand_limit: usize,
    pub backpack_limit: usize,
    /// 英雄结束回合时，交战中的怪物回满当前层生命值。
    pub monsters_regroup: bool,
    pub strength_self_damage: i32,
    pub discover_count: usize,
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            base_max_hp: 20,
            hero_attacks_per_turn: 2,
            hand_limit: 5,
            backpack_limit: 10,
            monsters_regroup: true,
            strength_self_damage: 1,
            discover_count: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DeckConfig {
    pub monsters_per_archetype: u8,
    pub weapons: u8,
    pub shields: u8,
    pub potions: u8,
    pub weapon_value: ValueRange,
    pub shield_value: ValueRange,
    pub potion_value: ValueRange,
    pub durability: ValueRange,
}

impl Default for DeckConfig {
    fn default() -> Self {
        Self {
            monsters_per_archetype: 5,
            weapons: 6,
            shields: 6,
            potions: 6,
            weapon_value: ValueRange::new(2, 7),
            shield_value: ValueRange::new(1, 5),
            potion_value: ValueRange::new(3, 8),
            durability: ValueRange::new(1, 3),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GameConfig {
    pub rules: RulesConfig,
    pub deck: DeckConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,
}

impl GameConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: GameConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rules.hero_attacks_per_turn == 0 {
            return Err(ConfigError::NoHeroAttacks);
        }
        self.deck.weapon_value.check("weapon_value")?;
        self.deck.shield_value.check("shield_value")?;
        self.deck.potion_value.check("potion_value")?;
        self.deck.durability.check("durability")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let config = GameConfig::from_json(r#"{"rules":{"hand_limit":3}}"#)
            .expect("partial config should parse");
        assert_eq!(config.rules.hand_limit, 3);
        assert_eq!(config.rules.base_max_hp, 20);
        assert_eq!(config.deck, DeckConfig::default());
    }

    #[test]
    fn empty_range_is_rejected() {
        let err = GameConfig::from_json(r#"{"deck":{"durability":{"min":3,"max":1}}}"#)
            .expect_err("inverted range must fail");
        assert!(matches!(
            err,
            ConfigError::EmptyRange {
                field: "durability",
                ..
            }
        ));
    }

    #[test]
    fn zero_attack_budget_is_rejected() {
        let err = GameConfig::from_json(r#"{"rules":{"hero_attacks_per_turn":0}}"#)
            .expect_err("zero attacks must fail");
        assert!(matches!(err, ConfigError::NoHeroAttacks));
    }
}
