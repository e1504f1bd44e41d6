use std::cmp::Ordering;
use std::collections::BinaryHeap;

use serde::{Deserialize, Serialize};

use super::card::{CardId, PermanentSkill, SlotBonus};
use super::state::{EquipSlot, GameEvent, GameState};
use super::waterfall::CascadeMode;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EffectCondition {
    GoldAtLeast { amount: i32 },
    HpAbove { amount: i32 },
    HasEquipment,
    HasAmulet,
    Any { conditions: Vec<EffectCondition> },
    All { conditions: Vec<EffectCondition> },
}

impl EffectCondition {
    pub fn is_satisfied(&self, ctx: &EffectContext, state: &GameState) -> bool {
        match self {
            EffectCondition::GoldAtLeast { amount } => state.gold >= *amount,
            EffectCondition::HpAbove { amount } => state.hp > *amount,
            EffectCondition::HasEquipment => state.equipment.iter().any(Option::is_some),
            EffectCondition::HasAmulet => state.equipped_amulets().next().is_some(),
            EffectCondition::Any { conditions } => conditions
                .iter()
                .any(|condition| condition.is_satisfied(ctx, state)),
            EffectCondition::All { conditions } => conditions
                .iter()
                .all(|condition| condition.is_satisfied(ctx, state)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EffectKind {
    HealHero {
        amount: i32,
    },
    DamageHero {
        amount: i32,
    },
    GainGold {
        amount: i32,
    },
    SpendGold {
        amount: i32,
    },
    GainTempShield {
        amount: i32,
    },
    /// 攻击上下文中的目标怪物。
    DamageMonster {
        amount: i32,
    },
    /// 为上下文中的装备栏提供永久加成。
    SlotBonus {
        damage: i32,
        shield: i32,
    },
    PermanentSkill {
        skill: PermanentSkill,
    },
    RepairEquipment {
        amount: u8,
    },
    NextWeaponBonus {
        amount: i32,
    },
    Unbreakable,
    MintCurse {
        damage: i32,
    },
    ForceCascade,
    Composite {
        effects: Vec<EffectKind>,
    },
    Conditional {
        condition: Box<EffectCondition>,
        effect: Box<EffectKind>,
    },
    Nothing,
}

impl EffectKind {
    /// 先结算支付，再结算购买的效果。
    pub fn priority(&self) -> i8 {
        match self {
            EffectKind::SpendGold { .. } => 10,
            EffectKind::DamageMonster { .. } => 5,
            EffectKind::ForceCascade => -10,
            _ => 0,
        }
    }

    pub fn can_trigger(&self, ctx: &EffectContext, state: &GameState) -> bool {
        match self {
            EffectKind::SpendGold { amount } => state.gold >= *amount,
            EffectKind::DamageMonster { .. } => ctx
                .target_card
                .and_then(|card_id| state.live_monster(card_id))
                .is_some(),
            EffectKind::SlotBonus { .. } => ctx.slot.is_some(),
            EffectKind::RepairEquipment { .. } => state.equipment.iter().any(Option::is_some),
            EffectKind::Composite { effects } => effects
                .iter()
                .any(|effect| effect.can_trigger(ctx, state)),
            EffectKind::Conditional { condition, effect } => {
                condition.is_satisfied(ctx, state) && effect.can_trigger(ctx, state)
            }
            _ => true,
        }
    }

    pub fn apply(&self, ctx: &EffectContext, state: &mut GameState) -> EffectResolution {
        let mut events = Vec::new();
        match self {
            EffectKind::HealHero { amount } => {
                state.heal_hero(*amount, &mut events);
            }
            EffectKind::DamageHero { amount } => {
                state.apply_damage(*amount, &mut events);
            }
            EffectKind::GainGold { amount } => events.extend(state.change_gold(*amount)),
            EffectKind::SpendGold { amount } => events.extend(state.change_gold(-*amount)),
            EffectKind::GainTempShield { amount } => state.gain_temp_shield(*amount, &mut events),
            EffectKind::DamageMonster { amount } => {
                if let Some(card_id) = ctx.target_card {
                    state.strike_monster(card_id, *amount, &mut events);
                }
            }
            EffectKind::SlotBonus { damage, shield } => {
                if let Some(slot) = ctx.slot {
                    let bonus = &mut state.slot_bonuses[slot.index()];
                    bonus.damage += damage;
                    bonus.shield += shield;
                    events.push(GameEvent::SlotBonusGained {
                        slot,
                        bonus: SlotBonus {
                            damage: *damage,
                            shield: *shield,
                        },
                    });
                }
            }
            EffectKind::PermanentSkill { skill } => {
                state.permanent_skills.push(*skill);
                events.push(GameEvent::SkillLearned { skill: *skill });
            }
            EffectKind::RepairEquipment { amount } => state.repair_equipment(*amount, &mut events),
            EffectKind::NextWeaponBonus { amount } => state.one_shots.next_weapon_bonus += amount,
            EffectKind::Unbreakable => state.one_shots.unbreakable = true,
            EffectKind::MintCurse { damage } => events.push(state.mint_curse(*damage)),
            EffectKind::ForceCascade => events.extend(state.request_cascade(CascadeMode::Reset)),
            EffectKind::Composite { effects } => {
                let mut resolution = EffectResolution::default();
                for effect in effects {
                    resolution.extend(effect.apply(ctx, state));
                }
                return resolution;
            }
            EffectKind::Conditional { condition, effect } => {
                if condition.is_satisfied(ctx, state) {
                    return effect.apply(ctx, state);
                }
            }
            EffectKind::Nothing => {}
        }
        EffectResolution { events }
    }
}

/// 效果的来源与目标。
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct EffectContext {
    pub source_card: Option<CardId>,
    pub target_card: Option<CardId>,
    pub slot: Option<EquipSlot>,
}

impl EffectContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_source_card(mut self, card_id: CardId) -> Self {
        self.source_card = Some(card_id);
        self
    }

    pub fn with_target_card(mut self, card_id: CardId) -> Self {
        self.target_card = Some(card_id);
        self
    }

    pub fn with_slot(mut self, slot: EquipSlot) -> Self {
        self.slot = Some(slot);
        self
    }
}

#[derive(Default, Debug, Clone)]
pub struct EffectResolution {
    pub events: Vec<GameEvent>,
}

impl EffectResolution {
    pub fn extend(&mut self, mut other: EffectResolution) {
        self.events.append(&mut other.events);
    }
}

#[derive(Debug, Clone)]
struct StackItem {
    priority: i8,
    order: u64,
    effect: EffectKind,
    context: EffectContext,
}

impl PartialEq for StackItem {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.order == other.order
    }
}

impl Eq for StackItem {}

impl PartialOrd for StackItem {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for StackItem {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.order.cmp(&self.order))
    }
}

/// 优先级高者先出，同优先级按插入顺序。
#[derive(Debug, Default)]
pub struct EffectStack {
    heap: BinaryHeap<StackItem>,
    order: u64,
}

impl EffectStack {
    pub fn push(&mut self, effect: EffectKind, context: EffectContext) {
        self.order += 1;
        self.heap.push(StackItem {
            priority: effect.priority(),
            order: self.order,
            effect,
            context,
        });
    }

    fn pop(&mut self) -> Option<StackItem> {
        self.heap.pop()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }
}

#[derive(Debug, Default)]
pub struct EffectEngine {
    stack: EffectStack,
}

impl EffectEngine {
    /// 拆开组合效果，使各部分按优先级排序。
    pub fn queue_effect(&mut self, effect: EffectKind, context: EffectContext) {
        match effect {
            EffectKind::Composite { effects } => {
                for effect in effects {
                    self.queue_effect(effect, context.clone());
                }
            }
            EffectKind::Nothing => {}
            effect => self.stack.push(effect, context),
        }
    }

    pub fn resolve_all(&mut self, state: &mut GameState) -> Vec<GameEvent> {
        let mut events = Vec::new();
        while let Some(item) = self.stack.pop() {
            if !item.effect.can_trigger(&item.context, state) {
                tracing::debug!(effect = ?item.effect, "effect skipped");
                continue;
            }
            let mut resolution = item.effect.apply(&item.context, state);
            events.extend(resolution.events.drain(..));
            if state.is_finished() {
                self.clear();
                break;
            }
        }
        events
    }

    pub fn clear(&mut self) {
        self.stack = EffectStack::default();
    }

    pub fn stack(&self) -> &EffectStack {
        &self.stack
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::state::fixtures::Table;
    use crate::game::state::GameOutcome;

    #[test]
    fn payment_resolves_before_reward() {
        let mut table = Table::new();
        table.state.gold = 5;
        let mut engine = EffectEngine::default();
        engine.queue_effect(
            EffectKind::Composite {
                effects: vec![
                    EffectKind::HealHero { amount: 3 },
                    EffectKind::SpendGold { amount: 5 },
                ],
            },
            EffectContext::new(),
        );
        assert_eq!(engine.stack().len(), 2);
        table.state.hp = 10;
        let events = engine.resolve_all(&mut table.state);
        assert_eq!(
            events.first(),
            Some(&GameEvent::GoldChanged { delta: -5, gold: 0 })
        );
        assert_eq!(table.state.hp, 13);
        assert!(engine.stack().is_empty());
    }

    #[test]
    fn unaffordable_payment_is_skipped() {
        let mut table = Table::new();
        table.state.gold = 2;
        let mut engine = EffectEngine::default();
        engine.queue_effect(EffectKind::SpendGold { amount: 5 }, EffectContext::new());
        assert!(engine.resolve_all(&mut table.state).is_empty());
        assert_eq!(table.state.gold, 2);
    }

    #[test]
    fn conditions_combine() {
        let mut table = Table::new();
        table.state.gold = 4;
        let ctx = EffectContext::new();
        let rich = EffectCondition::GoldAtLeast { amount: 4 };
        let armed = EffectCondition::HasEquipment;
        assert!(rich.is_satisfied(&ctx, &table.state));
        assert!(!armed.is_satisfied(&ctx, &table.state));
        assert!(EffectCondition::Any {
            conditions: vec![rich.clone(), armed.clone()]
        }
        .is_satisfied(&ctx, &table.state));
        assert!(!EffectCondition::All {
            conditions: vec![rich, armed]
        }
        .is_satisfied(&ctx, &table.state));
    }

    #[test]
    fn slot_bonus_needs_a_slot() {
        let mut table = Table::new();
        let drill = EffectKind::SlotBonus {
            damage: 1,
            shield: 0,
        };
        assert!(!drill.can_trigger(&EffectContext::new(), &table.state));
        let ctx = EffectContext::new().with_slot(EquipSlot::Right);
        drill.apply(&ctx, &mut table.state);
        assert_eq!(table.state.slot_bonuses[1].damage, 1);
    }

    #[test]
    fn fireball_damage_needs_live_target() {
        let mut table = Table::new();
        let goblin = table.monster(2, 4, 1);
        let id = table.put_active(0, goblin);
        let fireball = EffectKind::DamageMonster { amount: 4 };
        assert!(!fireball.can_trigger(&EffectContext::new(), &table.state));

        let ctx = EffectContext::new().with_target_card(id);
        assert!(fireball.can_trigger(&ctx, &table.state));
        let resolution = fireball.apply(&ctx, &mut table.state);
        assert!(resolution
            .events
            .iter()
            .any(|event| matches!(event, GameEvent::MonsterDefeated { .. })));
        assert_eq!(table.state.gold, 2);
    }

    #[test]
    fn defeat_stops_the_stack() {
        let mut table = Table::new();
        table.state.hp = 2;
        let mut engine = EffectEngine::default();
        engine.queue_effect(EffectKind::DamageHero { amount: 5 }, EffectContext::new());
        engine.queue_effect(EffectKind::GainGold { amount: 3 }, EffectContext::new());
        engine.resolve_all(&mut table.state);
        assert_eq!(table.state.outcome, Some(GameOutcome::Defeat));
        assert_eq!(table.state.gold, 0);
        assert!(engine.stack().is_empty());
    }

    #[test]
    fn conditional_effect_respects_condition() {
        let mut table = Table::new();
        let bonus = EffectKind::Conditional {
            condition: Box::new(EffectCondition::HpAbove { amount: 25 }),
            effect: Box::new(EffectKind::GainGold { amount: 9 }),
        };
        let ctx = EffectContext::new();
        assert!(!bonus.can_trigger(&ctx, &table.state));
        assert!(bonus.apply(&ctx, &mut table.state).events.is_empty());
    }
}
