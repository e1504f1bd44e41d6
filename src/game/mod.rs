//! 游戏核心逻辑模块（卡牌登记、瀑布行、战斗、规则引擎）。

pub mod card;
pub mod combat;
pub mod deck;
pub mod effects;
pub mod modifiers;
pub mod rules;
pub mod snapshot;
pub mod state;
pub mod waterfall;

pub use card::{
    AmuletEffect, AmuletStats, AuraBonus, Card, CardId, CardKind, CardType, Durability,
    EventChoice, MonsterArchetype, MonsterStats, PermanentSkill, SkillGrant, SlotBonus, Spell,
};
pub use combat::{BlockTarget, CombatState, Initiator, PendingBlock, Turn};
pub use deck::{create_deck, deck_size};
pub use effects::{
    EffectCondition, EffectContext, EffectEngine, EffectKind, EffectResolution, EffectStack,
};
pub use modifiers::{AmuletAggregate, DamageReport};
pub use rules::{Command, MoveTarget, RuleEngine, RuleError, RuleResolution};
pub use snapshot::{Snapshot, SnapshotError, SNAPSHOT_VERSION};
pub use state::{
    EquipSlot, GameEvent, GameOutcome, GameState, GameStats, HeroSkill, IntegrityError, OneShots,
    PendingChoice, Zone, AMULET_SLOTS, ROW_WIDTH,
};
pub use waterfall::{CascadeMode, CascadePhase, WaterfallState};
