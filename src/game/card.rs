use serde::{Deserialize, Serialize};

use super::effects::{EffectCondition, EffectKind};

/// 稳定的卡牌标识，在一局游戏内唯一。
pub type CardId = u32;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum CardType {
    Monster,
    Weapon,
    Shield,
    Potion,
    Amulet,
    Magic,
    Event,
    Skill,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum MonsterArchetype {
    Goblin,
    Skeleton,
    Orc,
    Wraith,
}

impl MonsterArchetype {
    pub const ALL: [MonsterArchetype; 4] = [
        MonsterArchetype::Goblin,
        MonsterArchetype::Skeleton,
        MonsterArchetype::Orc,
        MonsterArchetype::Wraith,
    ];

    pub fn name(self) -> &'static str {
        match self {
            MonsterArchetype::Goblin => "Goblin",
            MonsterArchetype::Skeleton => "Skeleton",
            MonsterArchetype::Orc => "Orc",
            MonsterArchetype::Wraith => "Wraith",
        }
    }
}

/// 怪物的战斗数据。`hp` 是当前怒气层的生命值。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MonsterStats {
    pub archetype: MonsterArchetype,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attack: Option<i32>,
    pub hp: i32,
    pub max_hp: i32,
    pub fury: u8,
    pub max_fury: u8,
    #[serde(default)]
    pub ambush: bool,
}

impl MonsterStats {
    pub fn is_defeated(&self) -> bool {
        self.fury == 0
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Durability {
    pub durability: u8,
    pub max_durability: u8,
}

impl Durability {
    pub fn new(max: u8) -> Self {
        Self {
            durability: max,
            max_durability: max,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum AmuletEffect {
    Heal,
    Balance,
    Life,
    Guardian,
    Flash,
    Strength,
}

impl AmuletEffect {
    pub const ALL: [AmuletEffect; 6] = [
        AmuletEffect::Heal,
        AmuletEffect::Balance,
        AmuletEffect::Life,
        AmuletEffect::Guardian,
        AmuletEffect::Flash,
        AmuletEffect::Strength,
    ];

    /// 旧存档中没有 `aura_bonus` 的护符所提供的光环。
    pub fn legacy_aura(self, value: i32) -> AuraBonus {
        match self {
            AmuletEffect::Strength => AuraBonus {
                attack: value,
                ..AuraBonus::default()
            },
            AmuletEffect::Guardian => AuraBonus {
                defense: value,
                ..AuraBonus::default()
            },
            AmuletEffect::Life => AuraBonus {
                max_hp: value,
                ..AuraBonus::default()
            },
            AmuletEffect::Heal | AmuletEffect::Balance | AmuletEffect::Flash => {
                AuraBonus::default()
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuraBonus {
    #[serde(default)]
    pub attack: i32,
    #[serde(default)]
    pub defense: i32,
    #[serde(default)]
    pub max_hp: i32,
}

impl std::ops::AddAssign for AuraBonus {
    fn add_assign(&mut self, other: Self) {
        self.attack += other.attack;
        self.defense += other.defense;
        self.max_hp += other.max_hp;
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AmuletStats {
    pub effect: AmuletEffect,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aura_bonus: Option<AuraBonus>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Spell {
    /// 按卡牌数值伤害目标怪物。
    Fireball,
    /// 恢复两个装备栏的耐久。
    Mend,
    /// 下一次武器攻击加上卡牌数值。
    Whetstone,
    /// 获得临时护盾。
    Aegis,
    /// 下一件将要损坏的装备不会损坏。
    Ward,
    /// 把预览行放回牌库并重新发牌。
    Reshuffle,
    /// 强制一次重置下落。
    Tremor,
    /// 与行动行中的所有怪物交战。
    BattleCry,
    /// 从牌库顶提供若干张牌供挑选。
    Insight,
    /// 伤害英雄。由事件生成，不能出售。
    Curse,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EventChoice {
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requirement: Option<EffectCondition>,
    pub effect: EffectKind,
}

impl EventChoice {
    pub fn new(label: impl Into<String>, effect: EffectKind) -> Self {
        Self {
            label: label.into(),
            requirement: None,
            effect,
        }
    }

    pub fn requires(mut self, condition: EffectCondition) -> Self {
        self.requirement = Some(condition);
        self
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SlotBonus {
    pub damage: i32,
    pub shield: i32,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PermanentSkill {
    #[serde(default)]
    pub attack: i32,
    #[serde(default)]
    pub defense: i32,
    #[serde(default)]
    pub max_hp: i32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "grant", rename_all = "snake_case")]
pub enum SkillGrant {
    /// 拖放到装备栏。
    Slot { damage: i32, shield: i32 },
    /// 拖放到英雄身上。
    Permanent { skill: PermanentSkill },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum CardKind {
    Monster(MonsterStats),
    Weapon(Durability),
    Shield(Durability),
    Potion,
    Amulet(AmuletStats),
    Magic { spell: Spell },
    Event { choices: Vec<EventChoice> },
    Skill { grant: SkillGrant },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Card {
    pub id: CardId,
    pub name: String,
    pub value: i32,
    pub kind: CardKind,
}

impl Card {
    pub fn new(id: CardId, name: impl Into<String>, value: i32, kind: CardKind) -> Self {
        Self {
            id,
            name: name.into(),
            value,
            kind,
        }
    }

    pub fn monster(id: CardId, archetype: MonsterArchetype, attack: i32, hp: i32, fury: u8) -> Self {
        Self::new(
            id,
            archetype.name(),
            attack,
            CardKind::Monster(MonsterStats {
                archetype,
                attack: Some(attack),
                hp,
                max_hp: hp,
                fury,
                max_fury: fury,
                ambush: matches!(archetype, MonsterArchetype::Wraith),
            }),
        )
    }

    pub fn weapon(id: CardId, name: impl Into<String>, value: i32, durability: u8) -> Self {
        Self::new(id, name, value, CardKind::Weapon(Durability::new(durability)))
    }

    pub fn shield(id: CardId, name: impl Into<String>, value: i32, durability: u8) -> Self {
        Self::new(id, name, value, CardKind::Shield(Durability::new(durability)))
    }

    pub fn potion(id: CardId, value: i32) -> Self {
        Self::new(id, "Potion", value, CardKind::Potion)
    }

    pub fn amulet(id: CardId, name: impl Into<String>, value: i32, effect: AmuletEffect) -> Self {
        Self::new(
            id,
            name,
            value,
            CardKind::Amulet(AmuletStats {
                effect,
                aura_bonus: None,
            }),
        )
    }

    pub fn magic(id: CardId, name: impl Into<String>, value: i32, spell: Spell) -> Self {
        Self::new(id, name, value, CardKind::Magic { spell })
    }

    pub fn card_type(&self) -> CardType {
        match self.kind {
            CardKind::Monster(_) => CardType::Monster,
            CardKind::Weapon(_) => CardType::Weapon,
            CardKind::Shield(_) => CardType::Shield,
            CardKind::Potion => CardType::Potion,
            CardKind::Amulet(_) => CardType::Amulet,
            CardKind::Magic { .. } => CardType::Magic,
            CardKind::Event { .. } => CardType::Event,
            CardKind::Skill { .. } => CardType::Skill,
        }
    }

    pub fn monster_stats(&self) -> Option<&MonsterStats> {
        match &self.kind {
            CardKind::Monster(stats) => Some(stats),
            _ => None,
        }
    }

    pub fn monster_stats_mut(&mut self) -> Option<&mut MonsterStats> {
        match &mut self.kind {
            CardKind::Monster(stats) => Some(stats),
            _ => None,
        }
    }

    /// 怪物的攻击力，缺省时取卡牌数值。
    pub fn attack_value(&self) -> i32 {
        self.monster_stats()
            .and_then(|stats| stats.attack)
            .unwrap_or(self.value)
    }

    pub fn durability(&self) -> Option<&Durability> {
        match &self.kind {
            CardKind::Weapon(durability) | CardKind::Shield(durability) => Some(durability),
            _ => None,
        }
    }

    pub fn durability_mut(&mut self) -> Option<&mut Durability> {
        match &mut self.kind {
            CardKind::Weapon(durability) | CardKind::Shield(durability) => Some(durability),
            _ => None,
        }
    }

    pub fn amulet_stats(&self) -> Option<&AmuletStats> {
        match &self.kind {
            CardKind::Amulet(stats) => Some(stats),
            _ => None,
        }
    }

    pub fn spell(&self) -> Option<Spell> {
        match self.kind {
            CardKind::Magic { spell } => Some(spell),
            _ => None,
        }
    }

    pub fn is_equipment(&self) -> bool {
        matches!(self.kind, CardKind::Weapon(_) | CardKind::Shield(_))
    }

    pub fn is_curse(&self) -> bool {
        self.spell() == Some(Spell::Curse)
    }

    pub fn sell_value(&self) -> i32 {
        match self.kind {
            CardKind::Event { .. } => 0,
            _ => (self.value / 2).max(1),
        }
    }
}
