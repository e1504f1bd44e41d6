//! 预览行 → 行动行的瀑布下落。
//!
//! 行动行只剩一张或更少时，预览卡牌落入空的行动列，
//! 弃掉一张多余的预览卡牌，再从牌库重新发预览行。
//! 每次下落先整体规划，再分三个阶段（下落、弃牌、发牌）执行，
//! 每个阶段结束时登记表都保持一致。

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::card::CardId;
use super::combat::Initiator;
use super::state::{GameEvent, GameOutcome, GameState, Row, Zone, ROW_WIDTH};

/// 一次结算中连锁下落的次数上限。
const MAX_CHAINED_CASCADES: usize = 16;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CascadePhase {
    Drop,
    Discard,
    Deal,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CascadeMode {
    /// 由占用阈值触发。
    Auto,
    /// 无视占用情况的强制完整下落。
    Reset,
}

/// 下落锁，以及仍在播放移除动画的计数。
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct WaterfallState {
    #[serde(default)]
    pub locked: bool,
    #[serde(default)]
    pub deferred: bool,
    #[serde(default)]
    pub pending_removals: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CascadePlan {
    pub full: bool,
    /// `(预览列, 行动列)` 对。
    pub drops: Vec<(usize, usize)>,
    pub discard: Option<usize>,
    /// 多余的预览列，放回牌库底。
    pub returned: Vec<usize>,
    pub shortfall: usize,
}

/// 决定每张预览卡牌的去向。既没有可移动的卡牌也没有空位时返回 `None`。
pub fn plan_cascade(preview: &Row, active: &Row, mode: CascadeMode) -> Option<CascadePlan> {
    let empty: Vec<usize> = (0..ROW_WIDTH).filter(|&c| active[c].is_none()).collect();
    let filled: Vec<usize> = (0..ROW_WIDTH).filter(|&c| preview[c].is_some()).collect();
    if filled.is_empty() && empty.is_empty() {
        return None;
    }

    let full = mode == CascadeMode::Reset || empty.len() == ROW_WIDTH;
    let wanted = if full {
        filled.len().min(empty.len())
    } else {
        empty.len().min(filled.len().saturating_sub(1))
    };

    let mut drops: Vec<(usize, usize)> = Vec::with_capacity(wanted);
    for &column in &empty {
        if drops.len() == wanted {
            break;
        }
        if preview[column].is_some() {
            drops.push((column, column));
        }
    }

    let mut spare = filled
        .iter()
        .copied()
        .filter(|column| !drops.iter().any(|(from, _)| from == column))
        .collect::<Vec<_>>()
        .into_iter();
    for &column in &empty {
        if drops.len() == wanted {
            break;
        }
        if drops.iter().any(|(_, to)| *to == column) {
            continue;
        }
        match spare.next() {
            Some(from) => drops.push((from, column)),
            None => break,
        }
    }

    let unused: Vec<usize> = filled
        .iter()
        .copied()
        .filter(|column| !drops.iter().any(|(from, _)| from == column))
        .collect();
    let (discard, returned) = if full {
        (None, unused)
    } else {
        match unused.split_first() {
            Some((first, rest)) => (Some(*first), rest.to_vec()),
            None => (None, Vec::new()),
        }
    };

    Some(CascadePlan {
        full,
        shortfall: wanted - drops.len(),
        drops,
        discard,
        returned,
    })
}

impl GameEvent {
    /// 开发模式下的断言报告，只记录日志，不抛出。
    pub fn diagnostic(message: impl Into<String>) -> Self {
        let message = message.into();
        tracing::warn!(%message, "invariant diagnostic");
        GameEvent::Diagnostic { message }
    }
}

impl GameState {
    /// 从牌库顶先发预览行，再发行动行。
    pub fn deal_opening_rows(&mut self) -> Vec<GameEvent> {
        let mut events = Vec::new();
        self.deal_preview(&mut events);
        let mut dealt = Vec::new();
        for column in 0..ROW_WIDTH {
            if self.active[column].is_some() {
                continue;
            }
            if let Some(card) = self.deck.pop() {
                dealt.push(card.id);
                self.active[column] = Some(card);
            }
        }
        events.push(GameEvent::CardsDealt { card_ids: dealt });
        events
    }

    /// 行动行最多剩一张卡，且局面仍可能变化。
    pub fn needs_cascade(&self) -> bool {
        let occupied = self.active_occupancy();
        !self.is_finished()
            && occupied <= 1
            && (self.preview_occupancy() > 0 || !self.deck.is_empty() || occupied == 0)
    }

    /// 执行当前行状态所需的全部下落。
    pub fn settle_rows(&mut self) -> Vec<GameEvent> {
        let mut events = Vec::new();
        let mut chained = 0;
        while self.needs_cascade() {
            if chained == MAX_CHAINED_CASCADES {
                events.push(GameEvent::diagnostic(format!(
                    "stopped after {chained} chained cascades"
                )));
                break;
            }
            if !self.try_cascade(CascadeMode::Auto, &mut events) {
                break;
            }
            chained += 1;
        }
        events
    }

    /// 强制或显式的下落请求。
    pub fn request_cascade(&mut self, mode: CascadeMode) -> Vec<GameEvent> {
        let mut events = Vec::new();
        if self.try_cascade(mode, &mut events) {
            events.extend(self.settle_rows());
        }
        events
    }

    /// 标记一次卡牌移除动画仍在进行。
    pub fn hold_removal(&mut self) {
        self.waterfall.pending_removals += 1;
    }

    /// 结束一次移除。最后一次释放会执行被推迟的下落，
    /// 但若仍有未完成的选择，下落会等待该选择结束。
    pub fn release_removal(&mut self) -> Vec<GameEvent> {
        let mut events = Vec::new();
        if self.waterfall.pending_removals == 0 {
            events.push(GameEvent::diagnostic("removal released without a hold"));
            return events;
        }
        self.waterfall.pending_removals -= 1;
        if self.waterfall.pending_removals > 0
            || !self.waterfall.deferred
            || self.pending.is_some()
        {
            return events;
        }
        self.waterfall.deferred = false;
        events.extend(self.settle_rows());
        if let Err(error) = self.integrity_check() {
            events.push(GameEvent::diagnostic(format!("integrity check failed: {error}")));
        }
        events
    }

    /// 把预览行放回牌库，洗牌后重新发牌。
    pub fn reshuffle_preview<R: Rng + ?Sized>(&mut self, rng: &mut R, events: &mut Vec<GameEvent>) {
        for column in 0..ROW_WIDTH {
            if let Some(card) = self.preview[column].take() {
                events.push(GameEvent::CardReturnedToDeck { card_id: card.id });
                self.deck.push(card);
            }
        }
        self.deck.shuffle(rng);
        self.deal_preview(events);
    }

    /// 请求被推迟或无事可做时返回 `false`。
    fn try_cascade(&mut self, mode: CascadeMode, events: &mut Vec<GameEvent>) -> bool {
        if self.waterfall.locked || self.waterfall.pending_removals > 0 {
            if !self.waterfall.deferred {
                self.waterfall.deferred = true;
                tracing::debug!(
                    locked = self.waterfall.locked,
                    pending = self.waterfall.pending_removals,
                    "cascade deferred"
                );
                events.push(GameEvent::CascadeDeferred);
            }
            return false;
        }

        self.waterfall.deferred = false;
        self.waterfall.locked = true;
        let dropped = self.run_cascade(mode, events);
        self.waterfall.locked = false;

        let Some(dropped) = dropped else {
            return false;
        };
        self.spring_ambushes(&dropped, events);
        true
    }

    fn run_cascade(&mut self, mode: CascadeMode, events: &mut Vec<GameEvent>) -> Option<Vec<CardId>> {
        let Some(plan) = plan_cascade(&self.preview, &self.active, mode) else {
            tracing::debug!("no-op cascade");
            return None;
        };
        self.stats.cascades += 1;
        tracing::debug!(?mode, drops = plan.drops.len(), full = plan.full, "cascade");
        events.push(GameEvent::CascadeStarted { mode });
        if plan.shortfall > 0 {
            events.push(GameEvent::diagnostic(format!(
                "cascade assignment short by {} card(s)",
                plan.shortfall
            )));
        }

        let mut dropped = Vec::with_capacity(plan.drops.len());
        for &(from, to) in &plan.drops {
            if let Some(card) = self.preview[from].take() {
                let card_id = card.id;
                self.active[to] = Some(card);
                dropped.push(card_id);
                events.push(GameEvent::CardDropped {
                    card_id,
                    from_column: from,
                    to_column: to,
                });
            }
        }
        events.push(GameEvent::CascadePhaseCompleted {
            phase: CascadePhase::Drop,
        });

        if let Some(column) = plan.discard {
            if let Some(card_id) = self.preview[column].as_ref().map(|card| card.id) {
                events.extend(self.discard(card_id, Zone::Preview { column }).ok());
            }
        }
        if !plan.returned.is_empty() && mode == CascadeMode::Auto {
            events.push(GameEvent::diagnostic(format!(
                "{} unused preview card(s) beyond the discard",
                plan.returned.len()
            )));
        }
        for &column in &plan.returned {
            if let Some(card) = self.preview[column].take() {
                events.push(GameEvent::CardReturnedToDeck { card_id: card.id });
                self.deck.insert(0, card);
            }
        }
        events.push(GameEvent::CascadePhaseCompleted {
            phase: CascadePhase::Discard,
        });

        self.deal_preview(events);
        events.push(GameEvent::CascadePhaseCompleted {
            phase: CascadePhase::Deal,
        });

        if self.deck.is_empty() && self.preview_occupancy() == 0 && self.active_occupancy() == 0 {
            events.extend(self.declare_outcome(GameOutcome::Victory));
        }
        Some(dropped)
    }

    fn deal_preview(&mut self, events: &mut Vec<GameEvent>) {
        let mut dealt = Vec::new();
        for column in 0..ROW_WIDTH {
            if self.preview[column].is_some() {
                continue;
            }
            let Some(card) = self.deck.pop() else {
                break;
            };
            dealt.push(card.id);
            self.preview[column] = Some(card);
        }
        events.push(GameEvent::CardsDealt { card_ids: dealt });
    }

    /// 刚落下的伏击怪物会主动开战。
    fn spring_ambushes(&mut self, dropped: &[CardId], events: &mut Vec<GameEvent>) {
        for &card_id in dropped {
            let ambusher = self
                .live_monster(card_id)
                .and_then(|card| card.monster_stats())
                .map_or(false, |stats| stats.ambush);
            if !ambusher || self.is_engaged(card_id) {
                continue;
            }
            match self.engage_monster(card_id, Initiator::Monster) {
                Ok(engaged) => events.extend(engaged),
                Err(error) => tracing::debug!(card_id, %error, "ambush skipped"),
            }
        }
    }
}
