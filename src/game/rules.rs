use rand::rngs::SmallRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::GameConfig;

use super::{
    card::{Card, CardId, CardKind, SkillGrant, Spell},
    combat::{BlockTarget, Initiator, Turn},
    deck::create_deck,
    effects::{EffectContext, EffectEngine, EffectKind},
    state::{
        EquipSlot, GameEvent, GameOutcome, GameState, HeroSkill, PendingChoice, Zone,
        AMULET_SLOTS,
    },
};

/// 被拖动卡牌的放置目标。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MoveTarget {
    Equipment { slot: EquipSlot },
    Amulet { index: usize },
    Backpack,
    Hero,
    Sell,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    MoveCard {
        card_id: CardId,
        from: Zone,
        to: MoveTarget,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target_card: Option<CardId>,
    },
    Attack {
        slot: EquipSlot,
        target: CardId,
    },
    EndTurn,
    ResolveBlock {
        target: BlockTarget,
    },
    ChooseEvent {
        index: usize,
    },
    ChooseDiscovery {
        card_id: CardId,
    },
    DrawFromBackpack,
    SelectHeroSkill {
        skill: HeroSkill,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Error)]
#[serde(tag = "type")]
pub enum RuleError {
    #[error("the run is over")]
    GameFinished,
    #[error("card {card_id} is not a live monster in the active row")]
    NotAMonster { card_id: CardId },
    #[error("monster {card_id} is already engaged")]
    AlreadyEngaged { card_id: CardId },
    #[error("only possible on the {expected:?} turn")]
    WrongTurn { expected: Turn },
    #[error("a monster attack must be blocked first")]
    AwaitingBlock,
    #[error("no combat in progress")]
    NotInCombat,
    #[error("the {slot:?} slot already attacked this turn")]
    SlotAlreadyAttacked { slot: EquipSlot },
    #[error("no attacks left this turn")]
    NoAttacksLeft,
    #[error("monster {card_id} is not engaged")]
    NotEngaged { card_id: CardId },
    #[error("no weapon in the {slot:?} slot")]
    NotAWeapon { slot: EquipSlot },
    #[error("no monster attack is waiting for a block")]
    NoPendingBlock,
    #[error("the backpack is empty")]
    BackpackEmpty,
    #[error("no room in {zone:?}")]
    NoRoom { zone: Zone },
    #[error("card {card_id} is not in {zone:?}")]
    CardNotFound { card_id: CardId, zone: Zone },
    #[error("cards cannot be taken from {zone:?}")]
    InvalidSource { zone: Zone },
    #[error("only the top backpack card can be used")]
    NotBackpackTop { card_id: CardId },
    #[error("card {card_id} cannot go to {to:?}")]
    InvalidMove { card_id: CardId, to: MoveTarget },
    #[error("card {card_id} needs a target")]
    MissingTarget { card_id: CardId },
    #[error("card {card_id} is not a valid target")]
    InvalidTarget { card_id: CardId },
    #[error("card {card_id} cannot be sold")]
    CannotSell { card_id: CardId },
    #[error("a pending choice must be resolved first")]
    ChoicePending,
    #[error("nothing to choose")]
    NoPendingChoice,
    #[error("choice {index} does not exist")]
    InvalidChoice { index: usize },
    #[error("requirements for choice {index} are not met")]
    RequirementNotMet { index: usize },
    #[error("a hero skill was already chosen")]
    HeroSkillAlreadyChosen,
}

/// 命令执行后的状态，以及执行过程中发生的事件。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleResolution {
    pub state: GameState,
    pub events: Vec<GameEvent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<GameOutcome>,
}

impl RuleResolution {
    pub fn new(state: GameState, mut events: Vec<GameEvent>) -> Self {
        let outcome = state.outcome;
        if let Some(outcome) = outcome {
            let has_event = events
                .iter()
                .any(|event| matches!(event, GameEvent::GameOver { .. }));
            if !has_event {
                events.push(GameEvent::GameOver { outcome });
            }
        }

        Self {
            state,
            events,
            outcome,
        }
    }
}

pub struct RuleEngine {
    rng: SmallRng,
    effect_engine: EffectEngine,
}

impl Default for RuleEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl RuleEngine {
    pub fn new() -> Self {
        Self {
            rng: SmallRng::from_entropy(),
            effect_engine: EffectEngine::default(),
        }
    }

    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: SmallRng::seed_from_u64(seed),
            effect_engine: EffectEngine::default(),
        }
    }

    /// 构建并洗牌，然后发两行。
    pub fn new_game(&mut self, config: &GameConfig) -> (GameState, Vec<GameEvent>) {
        let deck = create_deck(&config.deck, &mut self.rng);
        let deck_size = deck.len();
        let mut state = GameState::new(config.rules.clone()).with_deck(deck);
        tracing::info!(deck_size, "new game");

        let mut events = vec![GameEvent::GameStarted { deck_size }];
        events.extend(state.deal_opening_rows());
        events.extend(state.settle_rows());
        (state, events)
    }

    /// 执行一条命令。被拒绝的命令不会改动 `state`。
    pub fn apply(
        &mut self,
        state: &mut GameState,
        command: Command,
    ) -> Result<Vec<GameEvent>, RuleError> {
        Self::ensure_accepts(state, &command)?;

        let mut working = state.clone();
        let mut events = match self.execute(&mut working, command) {
            Ok(events) => events,
            Err(error) => {
                self.effect_engine.clear();
                tracing::debug!(%error, "command rejected");
                return Err(error);
            }
        };

        if working.pending.is_none() {
            events.extend(working.settle_rows());
        }
        if let Err(error) = working.integrity_check() {
            events.push(GameEvent::diagnostic(format!("integrity check failed: {error}")));
        }

        *state = working;
        Ok(events)
    }

    fn ensure_accepts(state: &GameState, command: &Command) -> Result<(), RuleError> {
        if state.is_finished() {
            return Err(RuleError::GameFinished);
        }
        match (&state.pending, command) {
            (Some(PendingChoice::Event { .. }), Command::ChooseEvent { .. })
            | (Some(PendingChoice::Discovery { .. }), Command::ChooseDiscovery { .. }) => {
                return Ok(())
            }
            (Some(_), _) => return Err(RuleError::ChoicePending),
            (None, Command::ChooseEvent { .. } | Command::ChooseDiscovery { .. }) => {
                return Err(RuleError::NoPendingChoice)
            }
            (None, _) => {}
        }
        if state.turn() == Some(Turn::Monster) && !matches!(command, Command::ResolveBlock { .. }) {
            return Err(RuleError::AwaitingBlock);
        }
        Ok(())
    }

    fn execute(
        &mut self,
        state: &mut GameState,
        command: Command,
    ) -> Result<Vec<GameEvent>, RuleError> {
        match command {
            Command::MoveCard {
                card_id,
                from,
                to,
                target_card,
            } => self.move_card(state, card_id, from, to, target_card),
            Command::Attack { slot, target } => state.perform_hero_attack(slot, target),
            Command::EndTurn => state.end_hero_turn(),
            Command::ResolveBlock { target } => state.resolve_block_choice(target),
            Command::ChooseEvent { index } => self.choose_event(state, index),
            Command::ChooseDiscovery { card_id } => Self::choose_discovery(state, card_id),
            Command::DrawFromBackpack => Ok(vec![state.draw_from_backpack()?]),
            Command::SelectHeroSkill { skill } => Self::select_hero_skill(state, skill),
        }
    }

    fn source_card(state: &GameState, card_id: CardId, from: Zone) -> Result<Card, RuleError> {
        match from {
            Zone::Active { .. } | Zone::Hand | Zone::Equipment { .. } | Zone::Amulet { .. } => {}
            Zone::Backpack => {
                if state.backpack.last().map(|card| card.id) != Some(card_id) {
                    return Err(RuleError::NotBackpackTop { card_id });
                }
            }
            Zone::Deck | Zone::Preview { .. } | Zone::Graveyard => {
                return Err(RuleError::InvalidSource { zone: from });
            }
        }
        state
            .card_in(from, card_id)
            .cloned()
            .ok_or(RuleError::CardNotFound {
                card_id,
                zone: from,
            })
    }

    fn move_card(
        &mut self,
        state: &mut GameState,
        card_id: CardId,
        from: Zone,
        to: MoveTarget,
        target_card: Option<CardId>,
    ) -> Result<Vec<GameEvent>, RuleError> {
        let card = Self::source_card(state, card_id, from)?;
        let invalid = RuleError::InvalidMove { card_id, to };

        match (&card.kind, to) {
            (CardKind::Monster(_), MoveTarget::Equipment { .. } | MoveTarget::Amulet { .. }) => {
                Self::ensure_active(from, invalid)?;
                state.engage_monster(card_id, Initiator::Hero)
            }
            (CardKind::Monster(_), MoveTarget::Hero) => {
                Self::ensure_active(from, invalid)?;
                state.engage_monster(card_id, Initiator::Monster)
            }
            (CardKind::Weapon(_) | CardKind::Shield(_), MoveTarget::Equipment { slot }) => {
                Self::equip_item(state, card_id, from, slot)
            }
            (CardKind::Potion, MoveTarget::Hero) => {
                let mut events = vec![state.discard(card_id, from)?];
                state.heal_hero(card.value, &mut events);
                Ok(events)
            }
            (CardKind::Amulet(_), MoveTarget::Amulet { index }) => {
                if index >= AMULET_SLOTS || from == (Zone::Amulet { index }) {
                    return Err(invalid);
                }
                let mut events = vec![state.move_card(card_id, from, Zone::Amulet { index })?];
                events.push(GameEvent::AmuletEquipped { card_id, index });
                state.clamp_hp();
                Ok(events)
            }
            (CardKind::Magic { spell }, MoveTarget::Hero) => {
                self.cast_spell(state, &card, *spell, from, target_card)
            }
            (CardKind::Event { .. }, MoveTarget::Hero) => {
                Self::ensure_active(from, invalid)?;
                state.pending = Some(PendingChoice::Event { card_id });
                tracing::debug!(card_id, "event opened");
                Ok(vec![GameEvent::EventOpened { card_id }])
            }
            (CardKind::Skill { grant }, MoveTarget::Equipment { slot }) => match grant {
                SkillGrant::Slot { damage, shield } => self.learn_skill(
                    state,
                    card_id,
                    from,
                    EffectKind::SlotBonus {
                        damage: *damage,
                        shield: *shield,
                    },
                    EffectContext::new().with_slot(slot),
                ),
                SkillGrant::Permanent { .. } => Err(invalid),
            },
            (CardKind::Skill { grant }, MoveTarget::Hero) => match grant {
                SkillGrant::Permanent { skill } => self.learn_skill(
                    state,
                    card_id,
                    from,
                    EffectKind::PermanentSkill { skill: *skill },
                    EffectContext::new(),
                ),
                SkillGrant::Slot { .. } => Err(invalid),
            },
            (CardKind::Event { .. }, MoveTarget::Sell) => {
                Self::ensure_active(from, invalid)?;
                Self::sell_card(state, &card, from)
            }
            (CardKind::Monster(_) | CardKind::Event { .. }, _) => Err(invalid),
            (_, MoveTarget::Backpack) => {
                if from == Zone::Backpack {
                    return Err(invalid);
                }
                let event = state.move_card(card_id, from, Zone::Backpack)?;
                state.clamp_hp();
                Ok(vec![event])
            }
            (_, MoveTarget::Sell) => Self::sell_card(state, &card, from),
            _ => Err(invalid),
        }
    }

    fn ensure_active(from: Zone, error: RuleError) -> Result<(), RuleError> {
        match from {
            Zone::Active { .. } => Ok(()),
            _ => Err(error),
        }
    }

    /// 被替换下来的装备进入墓地。
    fn equip_item(
        state: &mut GameState,
        card_id: CardId,
        from: Zone,
        slot: EquipSlot,
    ) -> Result<Vec<GameEvent>, RuleError> {
        let to = Zone::Equipment { slot };
        if from == to {
            return Err(RuleError::InvalidMove {
                card_id,
                to: MoveTarget::Equipment { slot },
            });
        }
        let mut events = Vec::new();
        if let Some(displaced) = state.equipped(slot).map(|card| card.id) {
            events.push(state.discard(displaced, to)?);
        }
        events.push(state.move_card(card_id, from, to)?);
        events.push(GameEvent::ItemEquipped { card_id, slot });
        Ok(events)
    }

    fn sell_card(state: &mut GameState, card: &Card, from: Zone) -> Result<Vec<GameEvent>, RuleError> {
        if card.is_curse() {
            return Err(RuleError::CannotSell { card_id: card.id });
        }
        let gold = card.sell_value();
        let mut events = vec![state.discard(card.id, from)?];
        events.push(GameEvent::CardSold {
            card_id: card.id,
            gold,
        });
        events.extend(state.change_gold(gold));
        state.clamp_hp();
        Ok(events)
    }

    fn learn_skill(
        &mut self,
        state: &mut GameState,
        card_id: CardId,
        from: Zone,
        effect: EffectKind,
        context: EffectContext,
    ) -> Result<Vec<GameEvent>, RuleError> {
        let mut events = vec![state.discard(card_id, from)?];
        self.effect_engine
            .queue_effect(effect, context.with_source_card(card_id));
        events.extend(self.effect_engine.resolve_all(state));
        Ok(events)
    }

    fn cast_spell(
        &mut self,
        state: &mut GameState,
        card: &Card,
        spell: Spell,
        from: Zone,
        target_card: Option<CardId>,
    ) -> Result<Vec<GameEvent>, RuleError> {
        let card_id = card.id;
        let mut context = EffectContext::new().with_source_card(card_id);
        if spell == Spell::Fireball {
            let target = target_card.ok_or(RuleError::MissingTarget { card_id })?;
            if state.live_monster(target).is_none() {
                return Err(RuleError::InvalidTarget { card_id: target });
            }
            context = context.with_target_card(target);
        }

        let mut events = vec![state.discard(card_id, from)?];
        events.push(GameEvent::SpellCast { card_id, spell });
        tracing::debug!(card_id, ?spell, "spell cast");

        let value = card.value;
        let effect = match spell {
            Spell::Fireball => EffectKind::DamageMonster { amount: value },
            Spell::Mend => EffectKind::RepairEquipment {
                amount: u8::try_from(value.max(1)).unwrap_or(u8::MAX),
            },
            Spell::Whetstone => EffectKind::NextWeaponBonus { amount: value },
            Spell::Aegis => EffectKind::GainTempShield { amount: value },
            Spell::Ward => EffectKind::Unbreakable,
            Spell::Tremor => EffectKind::ForceCascade,
            Spell::Curse => EffectKind::DamageHero { amount: value },
            Spell::Reshuffle => {
                state.reshuffle_preview(&mut self.rng, &mut events);
                return Ok(events);
            }
            Spell::BattleCry => {
                let monsters: Vec<CardId> = state
                    .active
                    .iter()
                    .flatten()
                    .filter(|card| state.live_monster(card.id).is_some())
                    .map(|card| card.id)
                    .filter(|id| !state.is_engaged(*id))
                    .collect();
                for monster_id in monsters {
                    events.extend(state.engage_monster(monster_id, Initiator::Hero)?);
                }
                return Ok(events);
            }
            Spell::Insight => {
                let options: Vec<CardId> = state
                    .deck
                    .iter()
                    .rev()
                    .take(state.rules.discover_count)
                    .map(|card| card.id)
                    .collect();
                if options.is_empty() {
                    tracing::debug!("nothing left to discover");
                } else {
                    state.pending = Some(PendingChoice::Discovery {
                        options: options.clone(),
                    });
                    events.push(GameEvent::DiscoveryOffered { options });
                }
                return Ok(events);
            }
        };

        self.effect_engine.queue_effect(effect, context);
        events.extend(self.effect_engine.resolve_all(state));
        Ok(events)
    }

    fn choose_event(
        &mut self,
        state: &mut GameState,
        index: usize,
    ) -> Result<Vec<GameEvent>, RuleError> {
        let Some(PendingChoice::Event { card_id }) = state.pending.clone() else {
            return Err(RuleError::NoPendingChoice);
        };
        let zone = state
            .locate(card_id)
            .ok_or(RuleError::CardNotFound {
                card_id,
                zone: Zone::Graveyard,
            })?;
        let choice = match state.card_in(zone, card_id).map(|card| &card.kind) {
            Some(CardKind::Event { choices }) => choices
                .get(index)
                .cloned()
                .ok_or(RuleError::InvalidChoice { index })?,
            _ => return Err(RuleError::InvalidTarget { card_id }),
        };
        let context = EffectContext::new().with_source_card(card_id);
        if let Some(requirement) = &choice.requirement {
            if !requirement.is_satisfied(&context, state) {
                return Err(RuleError::RequirementNotMet { index });
            }
        }

        state.pending = None;
        let mut events = vec![state.discard(card_id, zone)?];
        events.push(GameEvent::EventResolved {
            card_id,
            choice: index,
        });
        self.effect_engine.queue_effect(choice.effect, context);
        events.extend(self.effect_engine.resolve_all(state));
        Ok(events)
    }

    fn choose_discovery(state: &mut GameState, card_id: CardId) -> Result<Vec<GameEvent>, RuleError> {
        let Some(PendingChoice::Discovery { options }) = &state.pending else {
            return Err(RuleError::NoPendingChoice);
        };
        if !options.contains(&card_id) {
            return Err(RuleError::InvalidTarget { card_id });
        }
        let to = [Zone::Hand, Zone::Backpack]
            .into_iter()
            .find(|zone| state.has_room(*zone))
            .ok_or(RuleError::NoRoom {
                zone: Zone::Backpack,
            })?;
        let event = state.move_card(card_id, Zone::Deck, to)?;
        state.pending = None;
        Ok(vec![event])
    }

    fn select_hero_skill(state: &mut GameState, skill: HeroSkill) -> Result<Vec<GameEvent>, RuleError> {
        if state.hero_skill.is_some() {
            return Err(RuleError::HeroSkillAlreadyChosen);
        }
        state.hero_skill = Some(skill);
        tracing::info!(?skill, "hero skill selected");
        Ok(vec![GameEvent::HeroSkillSelected { skill }])
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashMap;

    const TARGETS: [MoveTarget; 7] = [
        MoveTarget::Equipment {
            slot: EquipSlot::Left,
        },
        MoveTarget::Equipment {
            slot: EquipSlot::Right,
        },
        MoveTarget::Amulet { index: 0 },
        MoveTarget::Amulet { index: 1 },
        MoveTarget::Backpack,
        MoveTarget::Hero,
        MoveTarget::Sell,
    ];

    fn first_monster(state: &GameState) -> Option<CardId> {
        state
            .active
            .iter()
            .flatten()
            .find(|card| state.live_monster(card.id).is_some())
            .map(|card| card.id)
    }

    /// 把三个随机字节转换成一条对 `state` 合理的命令。
    fn pick_command(state: &GameState, kind: u8, a: u8, b: u8) -> Command {
        let target = TARGETS[usize::from(b) % TARGETS.len()];
        match kind % 8 {
            0 | 1 => {
                let column = usize::from(a) % 5;
                match state.active[column].as_ref() {
                    Some(card) => Command::MoveCard {
                        card_id: card.id,
                        from: Zone::Active { column },
                        to: target,
                        target_card: first_monster(state),
                    },
                    None => Command::EndTurn,
                }
            }
            2 => match state.backpack.last() {
                Some(card) => Command::MoveCard {
                    card_id: card.id,
                    from: Zone::Backpack,
                    to: target,
                    target_card: first_monster(state),
                },
                None => Command::DrawFromBackpack,
            },
            3 => Command::Attack {
                slot: EquipSlot::ALL[usize::from(a) % 2],
                target: state
                    .combat
                    .as_ref()
                    .and_then(|combat| combat.engaged.first().copied())
                    .unwrap_or(u32::from(b)),
            },
            4 => Command::EndTurn,
            5 => Command::ResolveBlock {
                target: if a % 2 == 0 {
                    BlockTarget::Hero
                } else {
                    BlockTarget::Equipment {
                        slot: EquipSlot::ALL[usize::from(b) % 2],
                    }
                },
            },
            6 => match &state.pending {
                Some(PendingChoice::Discovery { options }) => Command::ChooseDiscovery {
                    card_id: options[usize::from(a) % options.len()],
                },
                _ => Command::ChooseEvent {
                    index: usize::from(a) % 3,
                },
            },
            _ => match state.hand.first() {
                Some(card) => Command::MoveCard {
                    card_id: card.id,
                    from: Zone::Hand,
                    to: target,
                    target_card: first_monster(state),
                },
                None => Command::DrawFromBackpack,
            },
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn prop_commands_preserve_the_registry(
            seed in any::<u64>(),
            steps in proptest::collection::vec((any::<u8>(), any::<u8>(), any::<u8>()), 1..120),
        ) {
            let mut engine = RuleEngine::with_seed(seed);
            let (mut state, _) = engine.new_game(&GameConfig::default());

            for (kind, a, b) in steps {
                let command = pick_command(&state, kind, a, b);
                let before = state.clone();
                let fury_before: HashMap<CardId, u8> = before
                    .all_cards()
                    .filter_map(|(_, card)| card.monster_stats().map(|stats| (card.id, stats.fury)))
                    .collect();
                match engine.apply(&mut state, command) {
                    Ok(events) => {
                        prop_assert!(state.integrity_check().is_ok());
                        let diagnosed = events
                            .iter()
                            .any(|event| matches!(event, GameEvent::Diagnostic { message } if message.starts_with("integrity")));
                        prop_assert!(!diagnosed);
                    }
                    Err(_) => prop_assert_eq!(&state, &before),
                }
                prop_assert!(state.hp >= 0 && state.hp <= state.max_hp());
                prop_assert!(state.gold >= 0);
                for (_, card) in state.all_cards() {
                    if let (Some(stats), Some(&fury)) =
                        (card.monster_stats(), fury_before.get(&card.id))
                    {
                        prop_assert!(stats.fury <= fury, "fury rose on monster {}", card.id);
                    }
                }
                if state.is_finished() {
                    break;
                }
            }
        }
    }
}
