//! 英雄与交战怪物之间的战斗。
//!
//! `idle` 即 `GameState::combat == None`。怪物交战后，状态在英雄回合
//! （攻击次数，每个栏位一次挥击）与怪物回合（攻击者队列，同一时间只有一个待格挡）
//! 之间交替，直到交战集合再次为空。

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use super::card::{Card, CardId, CardKind};
use super::rules::RuleError;
use super::state::{EquipSlot, GameEvent, GameState, Zone};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Initiator {
    Hero,
    Monster,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Turn {
    Hero,
    Monster,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "target", rename_all = "snake_case")]
pub enum BlockTarget {
    Hero,
    Equipment { slot: EquipSlot },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PendingBlock {
    pub monster_id: CardId,
    pub attack_value: i32,
    pub monster_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CombatState {
    /// 交战顺序，无重复。
    pub engaged: Vec<CardId>,
    pub initiator: Initiator,
    pub current_turn: Turn,
    pub hero_attacks_remaining: u8,
    pub hero_attacks_this_turn: [bool; 2],
    #[serde(default)]
    pub monster_attack_queue: VecDeque<CardId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_block: Option<PendingBlock>,
}

impl CombatState {
    fn new(initiator: Initiator, attack_budget: u8) -> Self {
        Self {
            engaged: Vec::new(),
            initiator,
            current_turn: match initiator {
                Initiator::Hero => Turn::Hero,
                Initiator::Monster => Turn::Monster,
            },
            hero_attacks_remaining: attack_budget,
            hero_attacks_this_turn: [false; 2],
            monster_attack_queue: VecDeque::new(),
            pending_block: None,
        }
    }

    pub fn is_engaged(&self, card_id: CardId) -> bool {
        self.engaged.contains(&card_id)
    }

    fn reset_attack_budget(&mut self, attack_budget: u8) {
        self.hero_attacks_remaining = attack_budget;
        self.hero_attacks_this_turn = [false; 2];
    }
}

/// 对怪物造成伤害的结果。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MonsterHit {
    pub dealt: i32,
    pub overflow: i32,
    pub defeated: bool,
}

impl GameState {
    /// 当前回合，空闲时为 `None`。
    pub fn turn(&self) -> Option<Turn> {
        self.combat.as_ref().map(|combat| combat.current_turn)
    }

    pub fn is_engaged(&self, card_id: CardId) -> bool {
        self.combat
            .as_ref()
            .map_or(false, |combat| combat.is_engaged(card_id))
    }

    /// 行动行中仍有怒气层的怪物。
    pub fn live_monster(&self, card_id: CardId) -> Option<&Card> {
        let column = self.active_column_of(card_id)?;
        self.active[column]
            .as_ref()
            .filter(|card| card.monster_stats().map_or(false, |stats| !stats.is_defeated()))
    }

    pub fn engage_monster(
        &mut self,
        monster_id: CardId,
        initiator: Initiator,
    ) -> Result<Vec<GameEvent>, RuleError> {
        if self.is_finished() {
            return Err(RuleError::GameFinished);
        }
        if self.live_monster(monster_id).is_none() {
            return Err(RuleError::NotAMonster {
                card_id: monster_id,
            });
        }

        let budget = self.rules.hero_attacks_per_turn;
        let mut events = Vec::new();
        match self.combat.as_mut() {
            Some(combat) => {
                if combat.is_engaged(monster_id) {
                    return Err(RuleError::AlreadyEngaged {
                        card_id: monster_id,
                    });
                }
                match (combat.current_turn, initiator) {
                    (Turn::Monster, Initiator::Hero) => {
                        return Err(RuleError::WrongTurn {
                            expected: Turn::Hero,
                        });
                    }
                    (Turn::Monster, Initiator::Monster) => {
                        combat.monster_attack_queue.push_back(monster_id);
                    }
                    (Turn::Hero, _) => {}
                }
                combat.engaged.push(monster_id);
                events.push(GameEvent::MonsterEngaged { monster_id });
            }
            None => {
                let mut combat = CombatState::new(initiator, budget);
                combat.engaged.push(monster_id);
                let turn = combat.current_turn;
                if turn == Turn::Monster {
                    combat.monster_attack_queue.push_back(monster_id);
                }
                self.combat = Some(combat);
                tracing::debug!(monster_id, ?initiator, "combat started");
                events.push(GameEvent::CombatStarted { initiator });
                events.push(GameEvent::MonsterEngaged { monster_id });
                events.push(GameEvent::TurnStarted { turn });
                self.advance_monster_turn(&mut events);
            }
        }
        Ok(events)
    }

    pub fn perform_hero_attack(
        &mut self,
        slot: EquipSlot,
        target: CardId,
    ) -> Result<Vec<GameEvent>, RuleError> {
        if self.is_finished() {
            return Err(RuleError::GameFinished);
        }
        let combat = self.combat.as_ref().ok_or(RuleError::NotInCombat)?;
        if combat.current_turn != Turn::Hero {
            return Err(RuleError::WrongTurn {
                expected: Turn::Hero,
            });
        }
        if combat.hero_attacks_this_turn[slot.index()] {
            return Err(RuleError::SlotAlreadyAttacked { slot });
        }
        if combat.hero_attacks_remaining == 0 {
            return Err(RuleError::NoAttacksLeft);
        }
        if !combat.is_engaged(target) {
            return Err(RuleError::NotEngaged { card_id: target });
        }
        let weapon_value = match self.equipped(slot) {
            Some(card) if matches!(card.kind, CardKind::Weapon(_)) => card.value,
            _ => return Err(RuleError::NotAWeapon { slot }),
        };

        let aggregate = self.amulet_aggregate();
        let flash_penalty = if aggregate.flash {
            aggregate.flash_penalty
        } else {
            0
        };
        let damage = (weapon_value
            + self.attack_bonus()
            + self.slot_bonuses[slot.index()].damage
            + self.one_shots.next_weapon_bonus
            + self.balance_bonus_for(slot)
            - flash_penalty)
            .max(0);
        self.one_shots.next_weapon_bonus = 0;

        let mut events = Vec::new();
        let iterations = if aggregate.flash { 2 } else { 1 };
        let mut swings = 0;
        for _ in 0..iterations {
            if self.live_monster(target).is_none() {
                break;
            }
            swings += 1;
            events.push(GameEvent::HeroAttacked {
                slot,
                monster_id: target,
                damage,
            });
            let hit = self.strike_monster(target, damage, &mut events);
            if hit.defeated && aggregate.life && hit.overflow > 0 {
                self.heal_hero(hit.overflow, &mut events);
            }
        }

        if aggregate.strength {
            let recoil = self.rules.strength_self_damage * swings;
            self.apply_damage(recoil, &mut events);
        }

        self.wear_equipment(slot, &mut events);

        if let Some(combat) = self.combat.as_mut() {
            combat.hero_attacks_remaining = combat.hero_attacks_remaining.saturating_sub(1);
            combat.hero_attacks_this_turn[slot.index()] = true;
        }
        Ok(events)
    }

    /// 在怪物当前怒气层内结算伤害，最后一层耗尽时执行击败流程。
    pub fn strike_monster(
        &mut self,
        monster_id: CardId,
        amount: i32,
        events: &mut Vec<GameEvent>,
    ) -> MonsterHit {
        let mut hit = MonsterHit::default();
        if amount <= 0 {
            return hit;
        }
        let Some(column) = self.active_column_of(monster_id) else {
            return hit;
        };
        let Some(stats) = self.active[column]
            .as_mut()
            .and_then(Card::monster_stats_mut)
        else {
            return hit;
        };
        if stats.is_defeated() {
            return hit;
        }

        let before = stats.hp.max(0);
        stats.hp -= amount;
        hit.dealt = amount.min(before);
        let mut layer_broken = false;
        if stats.hp <= 0 {
            hit.overflow = -stats.hp;
            stats.fury = stats.fury.saturating_sub(1);
            if stats.fury > 0 {
                stats.hp = stats.max_hp;
                layer_broken = true;
            } else {
                stats.hp = 0;
                hit.defeated = true;
            }
        }
        let (hp, fury) = (stats.hp, stats.fury);
        self.stats.damage_dealt += hit.dealt;

        events.push(GameEvent::MonsterDamaged {
            monster_id,
            amount,
            hp,
            fury,
        });
        if layer_broken {
            events.push(GameEvent::FuryLayerBroken { monster_id, fury });
        }
        if hit.defeated {
            self.defeat_monster(monster_id, events);
        }
        hit
    }

    /// 把被击败的怪物移入墓地、发放奖励并移出战斗。
    /// 没有剩余怪物时战斗回到空闲。
    pub fn defeat_monster(&mut self, monster_id: CardId, events: &mut Vec<GameEvent>) {
        let Some(column) = self.active_column_of(monster_id) else {
            return;
        };
        let Ok(discarded) = self.discard(monster_id, Zone::Active { column }) else {
            return;
        };
        let reward = self
            .graveyard
            .last()
            .map(|card| card.value.max(0))
            .unwrap_or(0);
        self.stats.monsters_defeated += 1;
        tracing::debug!(monster_id, reward, "monster defeated");
        events.push(discarded);
        events.push(GameEvent::MonsterDefeated {
            monster_id,
            gold: reward,
        });
        events.extend(self.change_gold(reward));

        let Some(combat) = self.combat.as_mut() else {
            return;
        };
        combat.engaged.retain(|id| *id != monster_id);
        combat.monster_attack_queue.retain(|id| *id != monster_id);
        if combat
            .pending_block
            .as_ref()
            .map_or(false, |block| block.monster_id == monster_id)
        {
            combat.pending_block = None;
        }
        if combat.engaged.is_empty() {
            self.combat = None;
            events.push(GameEvent::CombatEnded);
        }
    }

    pub fn end_hero_turn(&mut self) -> Result<Vec<GameEvent>, RuleError> {
        if self.is_finished() {
            return Err(RuleError::GameFinished);
        }
        let combat = self.combat.as_ref().ok_or(RuleError::NotInCombat)?;
        if combat.current_turn != Turn::Hero {
            return Err(RuleError::WrongTurn {
                expected: Turn::Hero,
            });
        }

        let mut events = Vec::new();
        if combat.engaged.is_empty() {
            self.combat = None;
            events.push(GameEvent::CombatEnded);
            return Ok(events);
        }

        let engaged = combat.engaged.clone();
        if self.rules.monsters_regroup {
            for &monster_id in &engaged {
                if let Some(stats) = self
                    .active_column_of(monster_id)
                    .and_then(|column| self.active[column].as_mut())
                    .and_then(Card::monster_stats_mut)
                {
                    stats.hp = stats.max_hp;
                }
            }
            events.push(GameEvent::MonstersRegrouped {
                monster_ids: engaged.clone(),
            });
        }

        events.extend(self.draw_from_backpack().ok());

        let budget = self.rules.hero_attacks_per_turn;
        if let Some(combat) = self.combat.as_mut() {
            combat.current_turn = Turn::Monster;
            combat.reset_attack_budget(budget);
            combat.monster_attack_queue = engaged.into_iter().collect();
        }
        events.push(GameEvent::TurnStarted { turn: Turn::Monster });
        self.advance_monster_turn(&mut events);
        Ok(events)
    }

    /// 依次弹出攻击者，直到有一个需要格挡决定。
    /// 没有待处理的攻击者时，把回合交还英雄或结束战斗。
    pub fn advance_monster_turn(&mut self, events: &mut Vec<GameEvent>) {
        loop {
            if self.is_finished() {
                return;
            }
            let next = match self.combat.as_mut() {
                Some(combat) if combat.pending_block.is_none() => {
                    combat.monster_attack_queue.pop_front()
                }
                _ => return,
            };

            let Some(monster_id) = next else {
                let budget = self.rules.hero_attacks_per_turn;
                let Some(combat) = self.combat.as_mut() else {
                    return;
                };
                if combat.engaged.is_empty() {
                    self.combat = None;
                    events.push(GameEvent::CombatEnded);
                } else {
                    combat.current_turn = Turn::Hero;
                    combat.reset_attack_budget(budget);
                    events.push(GameEvent::TurnStarted { turn: Turn::Hero });
                }
                return;
            };

            let attacker = self
                .live_monster(monster_id)
                .filter(|_| self.is_engaged(monster_id))
                .map(|card| (card.attack_value(), card.name.clone()));
            let Some((attack_value, monster_name)) = attacker else {
                continue;
            };
            if let Some(combat) = self.combat.as_mut() {
                combat.pending_block = Some(PendingBlock {
                    monster_id,
                    attack_value,
                    monster_name,
                });
            }
            events.push(GameEvent::MonsterAttacks {
                monster_id,
                attack_value,
            });
            return;
        }
    }

    pub fn resolve_block_choice(
        &mut self,
        target: BlockTarget,
    ) -> Result<Vec<GameEvent>, RuleError> {
        if self.is_finished() {
            return Err(RuleError::GameFinished);
        }
        let block = self
            .combat
            .as_ref()
            .ok_or(RuleError::NotInCombat)?
            .pending_block
            .clone()
            .ok_or(RuleError::NoPendingBlock)?;

        let mut events = Vec::new();
        let mut remaining = block.attack_value.max(0);
        let protected = self.temp_shield > 0 || self.has_shield_equipped();
        if let BlockTarget::Equipment { slot } = target {
            let shield_value = match self.equipped(slot) {
                Some(card) if matches!(card.kind, CardKind::Shield(_)) => Some(card.value),
                _ => None,
            };
            if let Some(value) = shield_value {
                let total = value
                    + self.defense_bonus()
                    + self.slot_bonuses[slot.index()].shield
                    + self.balance_bonus_for(slot);
                remaining = (remaining - total).max(0);
                self.wear_equipment(slot, &mut events);
            }
        }
        events.push(GameEvent::BlockResolved {
            monster_id: block.monster_id,
            target,
            blocked: block.attack_value.max(0) - remaining,
            damage: remaining,
        });
        self.apply_damage_with(remaining, protected, &mut events);

        if let Some(combat) = self.combat.as_mut() {
            combat.pending_block = None;
        }

        let spent = self
            .active_column_of(block.monster_id)
            .and_then(|column| self.active[column].as_mut())
            .and_then(Card::monster_stats_mut)
            .map(|stats| {
                stats.fury = stats.fury.saturating_sub(1);
                stats.fury
            });
        if let Some(fury) = spent {
            events.push(GameEvent::MonsterSpent {
                monster_id: block.monster_id,
                fury,
            });
            if fury == 0 {
                self.defeat_monster(block.monster_id, &mut events);
            }
        }

        self.advance_monster_turn(&mut events);
        Ok(events)
    }

    /// 把背包顶的卡牌移入手牌。
    pub fn draw_from_backpack(&mut self) -> Result<GameEvent, RuleError> {
        let top = self
            .backpack
            .last()
            .map(|card| card.id)
            .ok_or(RuleError::BackpackEmpty)?;
        self.move_card(top, Zone::Backpack, Zone::Hand)
    }
}
