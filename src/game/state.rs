use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

use crate::config::RulesConfig;

use super::card::{Card, CardId, CardKind, PermanentSkill, SlotBonus, Spell};
use super::combat::{BlockTarget, CombatState, Initiator, Turn};
use super::rules::RuleError;
use super::waterfall::{CascadeMode, CascadePhase, WaterfallState};

pub const ROW_WIDTH: usize = 5;
pub const AMULET_SLOTS: usize = 2;

pub type Row = [Option<Card>; ROW_WIDTH];

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum EquipSlot {
    Left,
    Right,
}

impl EquipSlot {
    pub const ALL: [EquipSlot; 2] = [EquipSlot::Left, EquipSlot::Right];

    pub fn index(self) -> usize {
        match self {
            EquipSlot::Left => 0,
            EquipSlot::Right => 1,
        }
    }
}

/// 卡牌可能所在的全部位置。每个卡牌 id 恰好位于其中一处。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(tag = "zone", rename_all = "snake_case")]
pub enum Zone {
    Deck,
    Preview { column: usize },
    Active { column: usize },
    Hand,
    Backpack,
    Equipment { slot: EquipSlot },
    Amulet { index: usize },
    Graveyard,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HeroSkill {
    Warrior,
    Sentinel,
    Vitality,
}

impl HeroSkill {
    pub fn bonus(self) -> PermanentSkill {
        match self {
            HeroSkill::Warrior => PermanentSkill {
                attack: 1,
                ..PermanentSkill::default()
            },
            HeroSkill::Sentinel => PermanentSkill {
                defense: 1,
                ..PermanentSkill::default()
            },
            HeroSkill::Vitality => PermanentSkill {
                max_hp: 5,
                ..PermanentSkill::default()
            },
        }
    }
}

/// 由魔法卡激活的一次性修正。
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct OneShots {
    #[serde(default)]
    pub next_weapon_bonus: i32,
    #[serde(default)]
    pub unbreakable: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct GameStats {
    pub damage_dealt: i32,
    pub damage_taken: i32,
    pub hp_healed: i32,
    pub monsters_defeated: u32,
    pub cascades: u32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum GameOutcome {
    Victory,
    Defeat,
}

/// 玩家必须先做出的选择，之前不能进行其他操作。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PendingChoice {
    Event { card_id: CardId },
    Discovery { options: Vec<CardId> },
}

/// 状态转换产生的通知，监听与否均可。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum GameEvent {
    GameStarted {
        deck_size: usize,
    },
    CardMoved {
        card_id: CardId,
        from: Zone,
        to: Zone,
    },
    CascadeStarted {
        mode: CascadeMode,
    },
    CascadePhaseCompleted {
        phase: CascadePhase,
    },
    CascadeDeferred,
    CardDropped {
        card_id: CardId,
        from_column: usize,
        to_column: usize,
    },
    CardDiscarded {
        card_id: CardId,
        from: Zone,
    },
    CardReturnedToDeck {
        card_id: CardId,
    },
    CardsDealt {
        card_ids: Vec<CardId>,
    },
    CombatStarted {
        initiator: Initiator,
    },
    MonsterEngaged {
        monster_id: CardId,
    },
    HeroAttacked {
        slot: EquipSlot,
        monster_id: CardId,
        damage: i32,
    },
    MonsterDamaged {
        monster_id: CardId,
        amount: i32,
        hp: i32,
        fury: u8,
    },
    FuryLayerBroken {
        monster_id: CardId,
        fury: u8,
    },
    MonsterDefeated {
        monster_id: CardId,
        gold: i32,
    },
    MonstersRegrouped {
        monster_ids: Vec<CardId>,
    },
    TurnStarted {
        turn: Turn,
    },
    MonsterAttacks {
        monster_id: CardId,
        attack_value: i32,
    },
    BlockResolved {
        monster_id: CardId,
        target: BlockTarget,
        blocked: i32,
        damage: i32,
    },
    MonsterSpent {
        monster_id: CardId,
        fury: u8,
    },
    CombatEnded,
    EquipmentWorn {
        card_id: CardId,
        durability: u8,
    },
    EquipmentBroken {
        card_id: CardId,
        slot: EquipSlot,
    },
    BreakPrevented {
        card_id: CardId,
    },
    EquipmentRepaired {
        card_id: CardId,
        durability: u8,
    },
    HeroDamaged {
        amount: i32,
        absorbed: i32,
        negated: bool,
        hp: i32,
    },
    HeroHealed {
        amount: i32,
        hp: i32,
    },
    GoldChanged {
        delta: i32,
        gold: i32,
    },
    CardSold {
        card_id: CardId,
        gold: i32,
    },
    ItemEquipped {
        card_id: CardId,
        slot: EquipSlot,
    },
    AmuletEquipped {
        card_id: CardId,
        index: usize,
    },
    SpellCast {
        card_id: CardId,
        spell: Spell,
    },
    TempShieldGained {
        amount: i32,
        total: i32,
    },
    EventOpened {
        card_id: CardId,
    },
    EventResolved {
        card_id: CardId,
        choice: usize,
    },
    DiscoveryOffered {
        options: Vec<CardId>,
    },
    SlotBonusGained {
        slot: EquipSlot,
        bonus: SlotBonus,
    },
    SkillLearned {
        skill: PermanentSkill,
    },
    HeroSkillSelected {
        skill: HeroSkill,
    },
    CurseMinted {
        card_id: CardId,
        zone: Zone,
    },
    GameOver {
        outcome: GameOutcome,
    },
    Diagnostic {
        message: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Error)]
#[serde(tag = "type")]
pub enum IntegrityError {
    #[error("card {card_id} is in two containers")]
    DuplicateCardId { card_id: CardId },
    #[error("card {card_id} was never issued")]
    UnknownCardId { card_id: CardId },
    #[error("{expected} cards issued but {found} located")]
    MissingCards { expected: usize, found: usize },
    #[error("{zone:?} holds {len} cards, limit {limit}")]
    ContainerOverflow { zone: Zone, len: usize, limit: usize },
    #[error("card {card_id} cannot sit in {zone:?}")]
    MisplacedCard { card_id: CardId, zone: Zone },
    #[error("engaged monster {card_id} is not in the active row")]
    StaleCombatant { card_id: CardId },
    #[error("monster {card_id} has fury {fury} above its starting {max_fury}")]
    FuryOverflow { card_id: CardId, fury: u8, max_fury: u8 },
    #[error("card {card_id} is still equipped at zero durability")]
    SpentEquipment { card_id: CardId },
}

/// 一整局游戏的状态：所有容器、英雄、战斗以及行的记录。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GameState {
    #[serde(default)]
    pub rules: RulesConfig,
    pub hp: i32,
    #[serde(default)]
    pub gold: i32,
    #[serde(default)]
    pub temp_shield: i32,
    /// 牌库顶是向量末尾。
    #[serde(default)]
    pub deck: Vec<Card>,
    #[serde(default)]
    pub preview: Row,
    #[serde(default)]
    pub active: Row,
    #[serde(default)]
    pub hand: Vec<Card>,
    /// 背包顶是向量末尾。
    #[serde(default)]
    pub backpack: Vec<Card>,
    #[serde(default)]
    pub equipment: [Option<Card>; 2],
    #[serde(default)]
    pub amulets: [Option<Card>; AMULET_SLOTS],
    #[serde(default)]
    pub graveyard: Vec<Card>,
    #[serde(default)]
    pub slot_bonuses: [SlotBonus; 2],
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hero_skill: Option<HeroSkill>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub permanent_skills: Vec<PermanentSkill>,
    #[serde(default)]
    pub one_shots: OneShots,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub combat: Option<CombatState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending: Option<PendingChoice>,
    #[serde(default)]
    pub waterfall: WaterfallState,
    pub next_card_id: CardId,
    #[serde(default)]
    pub stats: GameStats,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<GameOutcome>,
}

impl GameState {
    pub fn new(rules: RulesConfig) -> Self {
        Self {
            hp: rules.base_max_hp,
            rules,
            gold: 0,
            temp_shield: 0,
            deck: Vec::new(),
            preview: Default::default(),
            active: Default::default(),
            hand: Vec::new(),
            backpack: Vec::new(),
            equipment: Default::default(),
            amulets: Default::default(),
            graveyard: Vec::new(),
            slot_bonuses: Default::default(),
            hero_skill: None,
            permanent_skills: Vec::new(),
            one_shots: OneShots::default(),
            combat: None,
            pending: None,
            waterfall: WaterfallState::default(),
            next_card_id: 1,
            stats: GameStats::default(),
            outcome: None,
        }
    }

    /// 接管新建的牌库，id 必须是 `1..=len`。
    pub fn with_deck(mut self, deck: Vec<Card>) -> Self {
        let highest = deck.iter().map(|card| card.id).max().unwrap_or(0);
        self.next_card_id = self.next_card_id.max(highest + 1);
        self.deck = deck;
        self
    }

    pub fn mint_card_id(&mut self) -> CardId {
        let id = self.next_card_id;
        self.next_card_id += 1;
        id
    }

    pub fn is_finished(&self) -> bool {
        self.outcome.is_some()
    }

    pub fn declare_outcome(&mut self, outcome: GameOutcome) -> Option<GameEvent> {
        if self.outcome.is_some() {
            return None;
        }
        tracing::info!(?outcome, "game over");
        self.outcome = Some(outcome);
        Some(GameEvent::GameOver { outcome })
    }

    pub fn active_occupancy(&self) -> usize {
        self.active.iter().flatten().count()
    }

    pub fn preview_occupancy(&self) -> usize {
        self.preview.iter().flatten().count()
    }

    pub fn active_column_of(&self, card_id: CardId) -> Option<usize> {
        self.active
            .iter()
            .position(|slot| slot.as_ref().map(|card| card.id) == Some(card_id))
    }

    pub fn equipped(&self, slot: EquipSlot) -> Option<&Card> {
        self.equipment[slot.index()].as_ref()
    }

    pub fn equipped_amulets(&self) -> impl Iterator<Item = &Card> {
        self.amulets.iter().flatten()
    }

    pub fn all_cards(&self) -> impl Iterator<Item = (Zone, &Card)> {
        let deck = self.deck.iter().map(|card| (Zone::Deck, card));
        let preview = self.preview.iter().enumerate().filter_map(|(column, slot)| {
            slot.as_ref().map(|card| (Zone::Preview { column }, card))
        });
        let active = self.active.iter().enumerate().filter_map(|(column, slot)| {
            slot.as_ref().map(|card| (Zone::Active { column }, card))
        });
        let hand = self.hand.iter().map(|card| (Zone::Hand, card));
        let backpack = self.backpack.iter().map(|card| (Zone::Backpack, card));
        let equipment = EquipSlot::ALL.into_iter().filter_map(|slot| {
            self.equipped(slot)
                .map(|card| (Zone::Equipment { slot }, card))
        });
        let amulets = self.amulets.iter().enumerate().filter_map(|(index, slot)| {
            slot.as_ref().map(|card| (Zone::Amulet { index }, card))
        });
        let graveyard = self.graveyard.iter().map(|card| (Zone::Graveyard, card));
        deck.chain(preview)
            .chain(active)
            .chain(hand)
            .chain(backpack)
            .chain(equipment)
            .chain(amulets)
            .chain(graveyard)
    }

    pub fn locate(&self, card_id: CardId) -> Option<Zone> {
        self.all_cards()
            .find(|(_, card)| card.id == card_id)
            .map(|(zone, _)| zone)
    }

    pub fn card_in(&self, zone: Zone, card_id: CardId) -> Option<&Card> {
        let found = match zone {
            Zone::Deck => self.deck.iter().find(|card| card.id == card_id),
            Zone::Hand => self.hand.iter().find(|card| card.id == card_id),
            Zone::Backpack => self.backpack.iter().find(|card| card.id == card_id),
            Zone::Graveyard => self.graveyard.iter().find(|card| card.id == card_id),
            Zone::Preview { column } => self.preview.get(column)?.as_ref(),
            Zone::Active { column } => self.active.get(column)?.as_ref(),
            Zone::Equipment { slot } => self.equipment[slot.index()].as_ref(),
            Zone::Amulet { index } => self.amulets.get(index)?.as_ref(),
        };
        found.filter(|card| card.id == card_id)
    }

    pub fn card_in_mut(&mut self, zone: Zone, card_id: CardId) -> Option<&mut Card> {
        let found = match zone {
            Zone::Deck => self.deck.iter_mut().find(|card| card.id == card_id),
            Zone::Hand => self.hand.iter_mut().find(|card| card.id == card_id),
            Zone::Backpack => self.backpack.iter_mut().find(|card| card.id == card_id),
            Zone::Graveyard => self.graveyard.iter_mut().find(|card| card.id == card_id),
            Zone::Preview { column } => self.preview.get_mut(column)?.as_mut(),
            Zone::Active { column } => self.active.get_mut(column)?.as_mut(),
            Zone::Equipment { slot } => self.equipment[slot.index()].as_mut(),
            Zone::Amulet { index } => self.amulets.get_mut(index)?.as_mut(),
        };
        found.filter(|card| card.id == card_id)
    }

    pub fn has_room(&self, zone: Zone) -> bool {
        match zone {
            Zone::Deck | Zone::Graveyard => true,
            Zone::Hand => self.hand.len() < self.rules.hand_limit,
            Zone::Backpack => self.backpack.len() < self.rules.backpack_limit,
            Zone::Preview { column } => matches!(self.preview.get(column), Some(None)),
            Zone::Active { column } => matches!(self.active.get(column), Some(None)),
            Zone::Equipment { slot } => self.equipment[slot.index()].is_none(),
            Zone::Amulet { index } => matches!(self.amulets.get(index), Some(None)),
        }
    }

    /// 从 `zone` 取出一张卡牌，不在其中时返回 `None`。
    pub fn take_card(&mut self, zone: Zone, card_id: CardId) -> Option<Card> {
        fn take_from(cards: &mut Vec<Card>, card_id: CardId) -> Option<Card> {
            let index = cards.iter().position(|card| card.id == card_id)?;
            Some(cards.remove(index))
        }
        fn take_slot(slot: Option<&mut Option<Card>>, card_id: CardId) -> Option<Card> {
            let slot = slot?;
            if slot.as_ref()?.id != card_id {
                return None;
            }
            slot.take()
        }

        match zone {
            Zone::Deck => take_from(&mut self.deck, card_id),
            Zone::Hand => take_from(&mut self.hand, card_id),
            Zone::Backpack => take_from(&mut self.backpack, card_id),
            Zone::Graveyard => take_from(&mut self.graveyard, card_id),
            Zone::Preview { column } => take_slot(self.preview.get_mut(column), card_id),
            Zone::Active { column } => take_slot(self.active.get_mut(column), card_id),
            Zone::Equipment { slot } => {
                take_slot(self.equipment.get_mut(slot.index()), card_id)
            }
            Zone::Amulet { index } => take_slot(self.amulets.get_mut(index), card_id),
        }
    }

    /// 把卡牌放入 `zone`，放入牌库时置于牌库底。
    pub fn place_card(&mut self, zone: Zone, card: Card) -> Result<(), RuleError> {
        if !self.has_room(zone) {
            return Err(RuleError::NoRoom { zone });
        }
        match zone {
            Zone::Deck => self.deck.insert(0, card),
            Zone::Hand => self.hand.push(card),
            Zone::Backpack => self.backpack.push(card),
            Zone::Graveyard => self.graveyard.push(card),
            Zone::Preview { column } => self.preview[column] = Some(card),
            Zone::Active { column } => self.active[column] = Some(card),
            Zone::Equipment { slot } => self.equipment[slot.index()] = Some(card),
            Zone::Amulet { index } => self.amulets[index] = Some(card),
        }
        Ok(())
    }

    /// 在容器之间移动一张卡牌，作为单次状态转换。
    pub fn move_card(
        &mut self,
        card_id: CardId,
        from: Zone,
        to: Zone,
    ) -> Result<GameEvent, RuleError> {
        if !self.has_room(to) {
            return Err(RuleError::NoRoom { zone: to });
        }
        let card = self
            .take_card(from, card_id)
            .ok_or(RuleError::CardNotFound { card_id, zone: from })?;
        self.place_card(to, card)?;
        Ok(GameEvent::CardMoved { card_id, from, to })
    }

    pub fn discard(&mut self, card_id: CardId, from: Zone) -> Result<GameEvent, RuleError> {
        let card = self
            .take_card(from, card_id)
            .ok_or(RuleError::CardNotFound { card_id, zone: from })?;
        self.graveyard.push(card);
        Ok(GameEvent::CardDiscarded { card_id, from })
    }

    pub fn change_gold(&mut self, delta: i32) -> Option<GameEvent> {
        if delta == 0 {
            return None;
        }
        self.gold = (self.gold + delta).max(0);
        Some(GameEvent::GoldChanged {
            delta,
            gold: self.gold,
        })
    }

    /// 用新 id 生成诅咒卡，并放到能容纳它的位置。
    pub fn mint_curse(&mut self, damage: i32) -> GameEvent {
        let card_id = self.mint_card_id();
        let curse = Card::new(
            card_id,
            "Curse",
            damage,
            CardKind::Magic {
                spell: Spell::Curse,
            },
        );
        let zone = [Zone::Backpack, Zone::Hand]
            .into_iter()
            .find(|zone| self.has_room(*zone))
            .unwrap_or(Zone::Graveyard);
        match zone {
            Zone::Backpack => self.backpack.push(curse),
            Zone::Hand => self.hand.push(curse),
            _ => self.graveyard.push(curse),
        }
        GameEvent::CurseMinted { card_id, zone }
    }

    pub fn integrity_check(&self) -> Result<(), IntegrityError> {
        let mut seen = HashSet::new();
        for (zone, card) in self.all_cards() {
            if card.id == 0 || card.id >= self.next_card_id {
                return Err(IntegrityError::UnknownCardId { card_id: card.id });
            }
            if !seen.insert(card.id) {
                return Err(IntegrityError::DuplicateCardId { card_id: card.id });
            }
            let allowed = match zone {
                Zone::Equipment { .. } => card.is_equipment(),
                Zone::Amulet { .. } => card.amulet_stats().is_some(),
                _ => true,
            };
            if !allowed {
                return Err(IntegrityError::MisplacedCard {
                    card_id: card.id,
                    zone,
                });
            }
            if let Some(stats) = card.monster_stats() {
                if stats.fury > stats.max_fury {
                    return Err(IntegrityError::FuryOverflow {
                        card_id: card.id,
                        fury: stats.fury,
                        max_fury: stats.max_fury,
                    });
                }
            }
            if matches!(zone, Zone::Equipment { .. })
                && card.durability().is_some_and(|d| d.durability == 0)
            {
                return Err(IntegrityError::SpentEquipment { card_id: card.id });
            }
        }

        let expected = self.next_card_id.saturating_sub(1) as usize;
        if seen.len() != expected {
            return Err(IntegrityError::MissingCards {
                expected,
                found: seen.len(),
            });
        }

        for (zone, len, limit) in [
            (Zone::Hand, self.hand.len(), self.rules.hand_limit),
            (Zone::Backpack, self.backpack.len(), self.rules.backpack_limit),
        ] {
            if len > limit {
                return Err(IntegrityError::ContainerOverflow { zone, len, limit });
            }
        }

        if let Some(combat) = &self.combat {
            for &card_id in &combat.engaged {
                let live = self
                    .active_column_of(card_id)
                    .and_then(|column| self.active[column].as_ref())
                    .and_then(Card::monster_stats)
                    .is_some();
                if !live {
                    return Err(IntegrityError::StaleCombatant { card_id });
                }
            }
        }

        Ok(())
    }
}

impl Default for GameState {
    fn default() -> Self {
        Self::new(RulesConfig::default())
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use crate::game::card::{AmuletEffect, MonsterArchetype};

    /// 手工搭建状态，同时保持 id 连续。
    pub struct Table {
        pub state: GameState,
    }

    impl Table {
        pub fn new() -> Self {
            Self {
                state: GameState::default(),
            }
        }

        pub fn monster(&mut self, attack: i32, hp: i32, fury: u8) -> Card {
            let id = self.state.mint_card_id();
            let mut card = Card::monster(id, MonsterArchetype::Goblin, attack, hp, fury);
            if let Some(stats) = card.monster_stats_mut() {
                stats.ambush = false;
            }
            card
        }

        pub fn weapon(&mut self, value: i32, durability: u8) -> Card {
            let id = self.state.mint_card_id();
            Card::weapon(id, "Blade", value, durability)
        }

        pub fn shield(&mut self, value: i32, durability: u8) -> Card {
            let id = self.state.mint_card_id();
            Card::shield(id, "Buckler", value, durability)
        }

        pub fn amulet(&mut self, effect: AmuletEffect, value: i32) -> Card {
            let id = self.state.mint_card_id();
            Card::amulet(id, "Amulet", value, effect)
        }

        pub fn potion(&mut self, value: i32) -> Card {
            let id = self.state.mint_card_id();
            Card::potion(id, value)
        }

        pub fn magic(&mut self, spell: Spell, value: i32) -> Card {
            let id = self.state.mint_card_id();
            Card::magic(id, "Spell", value, spell)
        }

        pub fn filler(&mut self) -> Card {
            self.potion(1)
        }

        pub fn equip(&mut self, slot: EquipSlot, card: Card) -> CardId {
            let id = card.id;
            self.state.equipment[slot.index()] = Some(card);
            id
        }

        pub fn wear_amulet(&mut self, index: usize, card: Card) -> CardId {
            let id = card.id;
            self.state.amulets[index] = Some(card);
            id
        }

        pub fn put_active(&mut self, column: usize, card: Card) -> CardId {
            let id = card.id;
            self.state.active[column] = Some(card);
            id
        }

        pub fn put_preview(&mut self, column: usize, card: Card) -> CardId {
            let id = card.id;
            self.state.preview[column] = Some(card);
            id
        }
    }
}
