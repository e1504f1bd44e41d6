//! 英雄的派生数值，以及伤害、治疗、耐久损耗的唯一入口。
//!
//! 这里不做缓存：每次读取时都根据已装备的护符、技能和栏位加成重新计算。

use serde::{Deserialize, Serialize};

use super::card::{AmuletEffect, AuraBonus, Card, CardKind};
use super::state::{EquipSlot, GameEvent, GameOutcome, GameState, Zone};

/// 已装备护符的汇总。
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AmuletAggregate {
    pub aura: AuraBonus,
    pub heal: bool,
    pub balance: bool,
    pub life: bool,
    pub guardian: bool,
    pub flash: bool,
    pub strength: bool,
    pub balance_bonus: i32,
    pub flash_penalty: i32,
}

impl AmuletAggregate {
    pub fn from_amulets<'a>(amulets: impl IntoIterator<Item = &'a Card>) -> Self {
        let mut aggregate = Self::default();
        for card in amulets {
            let Some(stats) = card.amulet_stats() else {
                continue;
            };
            aggregate.aura += stats
                .aura_bonus
                .unwrap_or_else(|| stats.effect.legacy_aura(card.value));
            match stats.effect {
                AmuletEffect::Heal => aggregate.heal = true,
                AmuletEffect::Balance => {
                    aggregate.balance = true;
                    aggregate.balance_bonus += card.value;
                }
                AmuletEffect::Life => aggregate.life = true,
                AmuletEffect::Guardian => aggregate.guardian = true,
                AmuletEffect::Flash => {
                    aggregate.flash = true;
                    aggregate.flash_penalty += card.value;
                }
                AmuletEffect::Strength => aggregate.strength = true,
            }
        }
        aggregate
    }
}

/// `apply_damage` 对一次伤害的处理结果。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DamageReport {
    pub absorbed: i32,
    pub negated: bool,
    pub hp_lost: i32,
}

impl GameState {
    pub fn amulet_aggregate(&self) -> AmuletAggregate {
        AmuletAggregate::from_amulets(self.equipped_amulets())
    }

    fn skill_totals(&self) -> AuraBonus {
        let mut total = AuraBonus::default();
        let chosen = self.hero_skill.map(|skill| skill.bonus());
        for skill in self.permanent_skills.iter().chain(chosen.iter()) {
            total += AuraBonus {
                attack: skill.attack,
                defense: skill.defense,
                max_hp: skill.max_hp,
            };
        }
        total
    }

    pub fn max_hp(&self) -> i32 {
        let bonus = self.amulet_aggregate().aura.max_hp + self.skill_totals().max_hp;
        (self.rules.base_max_hp + bonus).max(1)
    }

    pub fn attack_bonus(&self) -> i32 {
        self.amulet_aggregate().aura.attack + self.skill_totals().attack
    }

    pub fn defense_bonus(&self) -> i32 {
        self.amulet_aggregate().aura.defense + self.skill_totals().defense
    }

    /// 平衡护符加成的栏位：两件装备中较弱的一件。
    pub fn balance_slot(&self) -> EquipSlot {
        let strength = |slot| self.equipped(slot).map(|card| card.value).unwrap_or(0);
        if strength(EquipSlot::Right) < strength(EquipSlot::Left) {
            EquipSlot::Right
        } else {
            EquipSlot::Left
        }
    }

    pub fn balance_bonus_for(&self, slot: EquipSlot) -> i32 {
        let aggregate = self.amulet_aggregate();
        if aggregate.balance && self.balance_slot() == slot {
            aggregate.balance_bonus
        } else {
            0
        }
    }

    pub fn has_shield_equipped(&self) -> bool {
        EquipSlot::ALL
            .into_iter()
            .filter_map(|slot| self.equipped(slot))
            .any(|card| matches!(card.kind, CardKind::Shield(ref d) if d.durability > 0))
    }

    /// 英雄扣血的唯一入口。
    pub fn apply_damage(&mut self, amount: i32, events: &mut Vec<GameEvent>) -> DamageReport {
        let protected = self.temp_shield > 0 || self.has_shield_equipped();
        self.apply_damage_with(amount, protected, events)
    }

    /// 守护判定在受击前完成的 `apply_damage`，
    /// 格挡时损坏的盾牌仍算作有防护。
    pub fn apply_damage_with(
        &mut self,
        amount: i32,
        protected: bool,
        events: &mut Vec<GameEvent>,
    ) -> DamageReport {
        let mut report = DamageReport::default();
        if amount <= 0 || self.is_finished() {
            return report;
        }

        let protected = protected || self.temp_shield > 0;
        let absorbed = amount.min(self.temp_shield);
        self.temp_shield -= absorbed;
        report.absorbed = absorbed;
        let remaining = amount - absorbed;

        if remaining > 0 && protected && self.amulet_aggregate().guardian {
            report.negated = true;
        } else if remaining > 0 {
            let before = self.hp;
            self.hp = (self.hp - remaining).max(0);
            report.hp_lost = before - self.hp;
            self.stats.damage_taken += report.hp_lost;
        }

        events.push(GameEvent::HeroDamaged {
            amount,
            absorbed: report.absorbed,
            negated: report.negated,
            hp: self.hp,
        });
        if self.hp == 0 {
            events.extend(self.declare_outcome(GameOutcome::Defeat));
        }
        report
    }

    /// 英雄回血的唯一入口，返回实际回复量。
    pub fn heal_hero(&mut self, amount: i32, events: &mut Vec<GameEvent>) -> i32 {
        if amount <= 0 || self.is_finished() {
            return 0;
        }
        let amount = if self.amulet_aggregate().heal {
            amount * 2
        } else {
            amount
        };
        let before = self.hp;
        self.hp = (self.hp + amount).min(self.max_hp()).max(before);
        let gained = self.hp - before;
        if gained > 0 {
            self.stats.hp_healed += gained;
            events.push(GameEvent::HeroHealed {
                amount: gained,
                hp: self.hp,
            });
        }
        gained
    }

    /// 上限可能刚刚降低，把生命值限制在上限以内。
    pub fn clamp_hp(&mut self) {
        self.hp = self.hp.min(self.max_hp());
    }

    pub fn gain_temp_shield(&mut self, amount: i32, events: &mut Vec<GameEvent>) {
        if amount <= 0 {
            return;
        }
        self.temp_shield += amount;
        events.push(GameEvent::TempShieldGained {
            amount,
            total: self.temp_shield,
        });
    }

    /// 使用一次 `slot` 中的装备。耐久归零时损坏并进入墓地，
    /// 除非已激活不可破坏效果。
    pub fn wear_equipment(&mut self, slot: EquipSlot, events: &mut Vec<GameEvent>) {
        let Some(card) = self.equipment[slot.index()].as_mut() else {
            return;
        };
        let card_id = card.id;
        let Some(durability) = card.durability_mut() else {
            return;
        };
        durability.durability = durability.durability.saturating_sub(1);
        let left = durability.durability;
        events.push(GameEvent::EquipmentWorn {
            card_id,
            durability: left,
        });
        if left > 0 {
            return;
        }

        if self.one_shots.unbreakable {
            self.one_shots.unbreakable = false;
            durability.durability = 1;
            events.push(GameEvent::BreakPrevented { card_id });
            return;
        }

        if let Ok(event) = self.discard(card_id, Zone::Equipment { slot }) {
            tracing::debug!(card_id, ?slot, "equipment broke");
            events.push(event);
            events.push(GameEvent::EquipmentBroken { card_id, slot });
        }
    }

    pub fn repair_equipment(&mut self, amount: u8, events: &mut Vec<GameEvent>) {
        for card in self.equipment.iter_mut().flatten() {
            let card_id = card.id;
            if let Some(durability) = card.durability_mut() {
                let repaired = durability
                    .durability
                    .saturating_add(amount)
                    .min(durability.max_durability);
                if repaired != durability.durability {
                    durability.durability = repaired;
                    events.push(GameEvent::EquipmentRepaired {
                        card_id,
                        durability: repaired,
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::card::{AmuletEffect, AmuletStats, PermanentSkill};
    use crate::game::state::fixtures::Table;
    use crate::game::state::HeroSkill;

    #[test]
    fn derived_stats_follow_equipment_changes() {
        let mut table = Table::new();
        let mut life = table.amulet(AmuletEffect::Life, 4);
        life.kind = CardKind::Amulet(AmuletStats {
            effect: AmuletEffect::Life,
            aura_bonus: Some(AuraBonus {
                attack: 1,
                defense: 2,
                max_hp: 6,
            }),
        });
        table.wear_amulet(0, life);
        table.state.permanent_skills.push(PermanentSkill {
            attack: 2,
            ..PermanentSkill::default()
        });
        table.state.hero_skill = Some(HeroSkill::Vitality);

        assert_eq!(table.state.max_hp(), 20 + 6 + 5);
        assert_eq!(table.state.attack_bonus(), 3);
        assert_eq!(table.state.defense_bonus(), 2);

        table.state.amulets[0] = None;
        assert_eq!(table.state.max_hp(), 25, "no stale aura after unequip");
        assert_eq!(table.state.attack_bonus(), 2);
    }

    #[test]
    fn legacy_amulet_value_counts_as_aura() {
        let mut table = Table::new();
        let strength = table.amulet(AmuletEffect::Strength, 3);
        table.wear_amulet(1, strength);
        assert_eq!(table.state.attack_bonus(), 3);
        assert!(table.state.amulet_aggregate().strength);
    }

    #[test]
    fn temp_shield_absorbs_first() {
        let mut table = Table::new();
        table.state.temp_shield = 3;
        let mut events = Vec::new();
        let report = table.state.apply_damage(5, &mut events);
        assert_eq!(report.absorbed, 3);
        assert_eq!(report.hp_lost, 2);
        assert_eq!(table.state.hp, 18);
        assert_eq!(table.state.temp_shield, 0);
    }

    #[test]
    fn guardian_negates_when_shield_equipped() {
        let mut table = Table::new();
        let guardian = table.amulet(AmuletEffect::Guardian, 0);
        table.wear_amulet(0, guardian);
        let buckler = table.shield(2, 2);
        table.equip(EquipSlot::Right, buckler);

        let mut events = Vec::new();
        let report = table.state.apply_damage(5, &mut events);
        assert!(report.negated);
        assert_eq!(table.state.hp, 20);
        let durability = table
            .state
            .equipped(EquipSlot::Right)
            .and_then(|card| card.durability())
            .map(|d| d.durability);
        assert_eq!(durability, Some(2), "guardian does not touch the shield");
    }

    #[test]
    fn guardian_needs_some_protection() {
        let mut table = Table::new();
        let guardian = table.amulet(AmuletEffect::Guardian, 0);
        table.wear_amulet(0, guardian);
        let mut events = Vec::new();
        table.state.apply_damage(4, &mut events);
        assert_eq!(table.state.hp, 16);
    }

    #[test]
    fn lethal_damage_floors_and_ends_run() {
        let mut table = Table::new();
        let mut events = Vec::new();
        table.state.apply_damage(99, &mut events);
        assert_eq!(table.state.hp, 0);
        assert_eq!(table.state.outcome, Some(GameOutcome::Defeat));
        assert!(events.contains(&GameEvent::GameOver {
            outcome: GameOutcome::Defeat
        }));
    }

    #[test]
    fn heal_amulet_doubles_and_clamps() {
        let mut table = Table::new();
        let heal = table.amulet(AmuletEffect::Heal, 0);
        table.wear_amulet(0, heal);
        table.state.hp = 10;
        let mut events = Vec::new();
        assert_eq!(table.state.heal_hero(3, &mut events), 6);
        assert_eq!(table.state.heal_hero(50, &mut events), 4);
        assert_eq!(table.state.hp, 20);
        assert_eq!(table.state.stats.hp_healed, 10);
    }

    #[test]
    fn balance_favours_weaker_slot() {
        let mut table = Table::new();
        let balance = table.amulet(AmuletEffect::Balance, 2);
        table.wear_amulet(0, balance);
        let sword = table.weapon(5, 2);
        table.equip(EquipSlot::Left, sword);
        let buckler = table.shield(2, 2);
        table.equip(EquipSlot::Right, buckler);
        assert_eq!(table.state.balance_slot(), EquipSlot::Right);
        assert_eq!(table.state.balance_bonus_for(EquipSlot::Right), 2);
        assert_eq!(table.state.balance_bonus_for(EquipSlot::Left), 0);
    }

    #[test]
    fn wear_breaks_at_zero_unless_warded() {
        let mut table = Table::new();
        let sword = table.weapon(4, 1);
        let sword_id = table.equip(EquipSlot::Left, sword);
        table.state.one_shots.unbreakable = true;

        let mut events = Vec::new();
        table.state.wear_equipment(EquipSlot::Left, &mut events);
        assert!(events.contains(&GameEvent::BreakPrevented { card_id: sword_id }));
        assert!(!table.state.one_shots.unbreakable);
        assert!(table.state.equipped(EquipSlot::Left).is_some());

        table.state.wear_equipment(EquipSlot::Left, &mut events);
        assert!(table.state.equipped(EquipSlot::Left).is_none());
        assert_eq!(table.state.locate(sword_id), Some(Zone::Graveyard));
    }

    #[test]
    fn repair_is_capped_at_max() {
        let mut table = Table::new();
        let mut sword = table.weapon(4, 3);
        if let Some(durability) = sword.durability_mut() {
            durability.durability = 1;
        }
        table.equip(EquipSlot::Left, sword);
        let mut events = Vec::new();
        table.state.repair_equipment(5, &mut events);
        let durability = table
            .state
            .equipped(EquipSlot::Left)
            .and_then(|card| card.durability())
            .map(|d| d.durability);
        assert_eq!(durability, Some(3));
    }
}
