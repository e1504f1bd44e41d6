//! 固定的牌库构成与洗牌。

use once_cell::sync::Lazy;
use rand::seq::SliceRandom;
use rand::Rng;

use crate::config::{DeckConfig, ValueRange};

use super::card::{
    AmuletEffect, AmuletStats, AuraBonus, Card, CardId, CardKind, EventChoice, MonsterArchetype,
    PermanentSkill, SkillGrant, Spell,
};
use super::effects::{EffectCondition, EffectKind};

struct MonsterProfile {
    attack: ValueRange,
    hp: ValueRange,
    fury: (u8, u8),
}

fn profile(archetype: MonsterArchetype) -> MonsterProfile {
    match archetype {
        MonsterArchetype::Goblin => MonsterProfile {
            attack: ValueRange::new(2, 4),
            hp: ValueRange::new(3, 5),
            fury: (1, 1),
        },
        MonsterArchetype::Skeleton => MonsterProfile {
            attack: ValueRange::new(3, 5),
            hp: ValueRange::new(4, 6),
            fury: (1, 2),
        },
        MonsterArchetype::Orc => MonsterProfile {
            attack: ValueRange::new(4, 6),
            hp: ValueRange::new(6, 8),
            fury: (2, 2),
        },
        MonsterArchetype::Wraith => MonsterProfile {
            attack: ValueRange::new(3, 6),
            hp: ValueRange::new(4, 7),
            fury: (2, 3),
        },
    }
}

struct AmuletTemplate {
    name: &'static str,
    value: i32,
    effect: AmuletEffect,
    aura_bonus: Option<AuraBonus>,
}

static AMULETS: Lazy<Vec<AmuletTemplate>> = Lazy::new(|| {
    vec![
        AmuletTemplate {
            name: "Amulet of Mending",
            value: 4,
            effect: AmuletEffect::Heal,
            aura_bonus: None,
        },
        AmuletTemplate {
            name: "Amulet of Balance",
            value: 2,
            effect: AmuletEffect::Balance,
            aura_bonus: None,
        },
        AmuletTemplate {
            name: "Amulet of Life",
            value: 5,
            effect: AmuletEffect::Life,
            aura_bonus: Some(AuraBonus {
                max_hp: 5,
                ..AuraBonus::default()
            }),
        },
        AmuletTemplate {
            name: "Guardian Charm",
            value: 1,
            effect: AmuletEffect::Guardian,
            aura_bonus: None,
        },
        AmuletTemplate {
            name: "Flash Pendant",
            value: 2,
            effect: AmuletEffect::Flash,
            aura_bonus: None,
        },
        AmuletTemplate {
            name: "Amulet of Strength",
            value: 2,
            effect: AmuletEffect::Strength,
            aura_bonus: Some(AuraBonus {
                attack: 2,
                ..AuraBonus::default()
            }),
        },
    ]
});

static SPELLS: Lazy<Vec<(&'static str, i32, Spell)>> = Lazy::new(|| {
    vec![
        ("Fireball", 4, Spell::Fireball),
        ("Mend", 1, Spell::Mend),
        ("Whetstone", 3, Spell::Whetstone),
        ("Aegis", 4, Spell::Aegis),
        ("Ward", 2, Spell::Ward),
        ("Reshuffle", 1, Spell::Reshuffle),
        ("Tremor", 1, Spell::Tremor),
        ("Battle Cry", 2, Spell::BattleCry),
        ("Insight", 2, Spell::Insight),
    ]
});

fn paid(cost: i32, effect: EffectKind) -> EffectKind {
    EffectKind::Composite {
        effects: vec![EffectKind::SpendGold { amount: cost }, effect],
    }
}

fn leave() -> EventChoice {
    EventChoice::new("Leave", EffectKind::Nothing)
}

static EVENTS: Lazy<Vec<(&'static str, Vec<EventChoice>)>> = Lazy::new(|| {
    vec![
        (
            "Shrine",
            vec![
                EventChoice::new("Pray", EffectKind::HealHero { amount: 8 }),
                EventChoice::new(
                    "Make an offering",
                    paid(
                        5,
                        EffectKind::PermanentSkill {
                            skill: PermanentSkill {
                                max_hp: 3,
                                ..PermanentSkill::default()
                            },
                        },
                    ),
                )
                .requires(EffectCondition::GoldAtLeast { amount: 5 }),
                leave(),
            ],
        ),
        (
            "Blacksmith",
            vec![
                EventChoice::new("Repair gear", paid(3, EffectKind::RepairEquipment { amount: 2 }))
                    .requires(EffectCondition::All {
                        conditions: vec![
                            EffectCondition::HasEquipment,
                            EffectCondition::GoldAtLeast { amount: 3 },
                        ],
                    }),
                EventChoice::new("Sharpen", paid(2, EffectKind::NextWeaponBonus { amount: 3 }))
                    .requires(EffectCondition::GoldAtLeast { amount: 2 }),
                leave(),
            ],
        ),
        (
            "Cursed Chest",
            vec![
                EventChoice::new(
                    "Open it",
                    EffectKind::Composite {
                        effects: vec![
                            EffectKind::GainGold { amount: 8 },
                            EffectKind::MintCurse { damage: 3 },
                        ],
                    },
                ),
                leave(),
            ],
        ),
        (
            "Wandering Merchant",
            vec![
                EventChoice::new("Buy an elixir", paid(4, EffectKind::HealHero { amount: 10 }))
                    .requires(EffectCondition::GoldAtLeast { amount: 4 }),
                EventChoice::new("Buy a ward", paid(3, EffectKind::Unbreakable))
                    .requires(EffectCondition::GoldAtLeast { amount: 3 }),
                leave(),
            ],
        ),
        (
            "Training Grounds",
            vec![
                EventChoice::new(
                    "Spar",
                    EffectKind::Composite {
                        effects: vec![
                            EffectKind::DamageHero { amount: 3 },
                            EffectKind::PermanentSkill {
                                skill: PermanentSkill {
                                    attack: 1,
                                    ..PermanentSkill::default()
                                },
                            },
                        ],
                    },
                )
                .requires(EffectCondition::HpAbove { amount: 5 }),
                EventChoice::new("Meditate", EffectKind::GainTempShield { amount: 3 }),
            ],
        ),
    ]
});

static SKILLS: Lazy<Vec<(&'static str, i32, SkillGrant)>> = Lazy::new(|| {
    vec![
        ("Blade Drill", 2, SkillGrant::Slot { damage: 1, shield: 0 }),
        ("Guard Drill", 2, SkillGrant::Slot { damage: 0, shield: 1 }),
        (
            "Strength Training",
            3,
            SkillGrant::Permanent {
                skill: PermanentSkill {
                    attack: 1,
                    ..PermanentSkill::default()
                },
            },
        ),
        (
            "Iron Skin",
            3,
            SkillGrant::Permanent {
                skill: PermanentSkill {
                    defense: 1,
                    ..PermanentSkill::default()
                },
            },
        ),
        (
            "Endurance Training",
            3,
            SkillGrant::Permanent {
                skill: PermanentSkill {
                    max_hp: 3,
                    ..PermanentSkill::default()
                },
            },
        ),
    ]
});

/// `create_deck` 针对 `config` 生成的卡牌数量。
pub fn deck_size(config: &DeckConfig) -> usize {
    usize::from(config.monsters_per_archetype) * MonsterArchetype::ALL.len()
        + usize::from(config.weapons)
        + usize::from(config.shields)
        + usize::from(config.potions)
        + AMULETS.len()
        + SPELLS.len()
        + EVENTS.len()
        + SKILLS.len()
}

fn roll<R: Rng + ?Sized>(rng: &mut R, range: ValueRange) -> i32 {
    rng.gen_range(range.min..=range.max.max(range.min))
}

fn roll_durability<R: Rng + ?Sized>(rng: &mut R, range: ValueRange) -> u8 {
    let rolled = roll(rng, range).clamp(1, i32::from(u8::MAX));
    u8::try_from(rolled).unwrap_or(1)
}

/// 构建整局的牌库，id 为 `1..=len`，均匀洗牌。
/// 牌库顶是返回向量的末尾。
pub fn create_deck<R: Rng + ?Sized>(config: &DeckConfig, rng: &mut R) -> Vec<Card> {
    let mut deck = Vec::with_capacity(deck_size(config));
    let mut next_id: CardId = 1;
    let mut mint = || {
        let id = next_id;
        next_id += 1;
        id
    };

    for archetype in MonsterArchetype::ALL {
        let profile = profile(archetype);
        for _ in 0..config.monsters_per_archetype {
            let attack = roll(rng, profile.attack);
            let hp = roll(rng, profile.hp);
            let fury = rng.gen_range(profile.fury.0..=profile.fury.1);
            deck.push(Card::monster(mint(), archetype, attack, hp, fury));
        }
    }
    for index in 0..config.weapons {
        let name = if index % 2 == 0 { "Sword" } else { "Axe" };
        let value = roll(rng, config.weapon_value);
        let durability = roll_durability(rng, config.durability);
        deck.push(Card::weapon(mint(), name, value, durability));
    }
    for index in 0..config.shields {
        let name = if index % 2 == 0 { "Buckler" } else { "Tower Shield" };
        let value = roll(rng, config.shield_value);
        let durability = roll_durability(rng, config.durability);
        deck.push(Card::shield(mint(), name, value, durability));
    }
    for _ in 0..config.potions {
        let value = roll(rng, config.potion_value);
        deck.push(Card::potion(mint(), value));
    }
    for template in AMULETS.iter() {
        let mut card = Card::amulet(mint(), template.name, template.value, template.effect);
        card.kind = CardKind::Amulet(AmuletStats {
            effect: template.effect,
            aura_bonus: template.aura_bonus,
        });
        deck.push(card);
    }
    for &(name, value, spell) in SPELLS.iter() {
        deck.push(Card::magic(mint(), name, value, spell));
    }
    for (name, choices) in EVENTS.iter() {
        deck.push(Card::new(
            mint(),
            *name,
            0,
            CardKind::Event {
                choices: choices.clone(),
            },
        ));
    }
    for &(name, value, grant) in SKILLS.iter() {
        deck.push(Card::new(mint(), name, value, CardKind::Skill { grant }));
    }

    deck.shuffle(rng);
    tracing::debug!(size = deck.len(), "deck created");
    deck
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::card::CardType;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;
    use std::collections::HashSet;

    fn count(deck: &[Card], card_type: CardType) -> usize {
        deck.iter()
            .filter(|card| card.card_type() == card_type)
            .count()
    }

    #[test]
    fn composition_is_fixed() {
        let config = DeckConfig::default();
        let mut rng = SmallRng::seed_from_u64(7);
        let deck = create_deck(&config, &mut rng);

        assert_eq!(deck.len(), deck_size(&config));
        assert_eq!(count(&deck, CardType::Monster), 20);
        assert_eq!(count(&deck, CardType::Weapon), 6);
        assert_eq!(count(&deck, CardType::Shield), 6);
        assert_eq!(count(&deck, CardType::Potion), 6);
        assert_eq!(count(&deck, CardType::Amulet), 6);
        assert_eq!(count(&deck, CardType::Magic), 9);
        assert_eq!(count(&deck, CardType::Event), 5);
        assert_eq!(count(&deck, CardType::Skill), 5);
        assert!(deck.iter().all(|card| !card.is_curse()));
    }

    #[test]
    fn ids_are_contiguous_and_unique() {
        let mut rng = SmallRng::seed_from_u64(11);
        let deck = create_deck(&DeckConfig::default(), &mut rng);
        let ids: HashSet<CardId> = deck.iter().map(|card| card.id).collect();
        assert_eq!(ids.len(), deck.len());
        assert!((1..=deck.len() as CardId).all(|id| ids.contains(&id)));
    }

    #[test]
    fn stats_stay_in_range() {
        let config = DeckConfig::default();
        let mut rng = SmallRng::seed_from_u64(3);
        for card in create_deck(&config, &mut rng) {
            match &card.kind {
                CardKind::Monster(stats) => {
                    let profile = profile(stats.archetype);
                    let attack = stats.attack.unwrap_or(card.value);
                    assert!((profile.attack.min..=profile.attack.max).contains(&attack));
                    assert!((profile.hp.min..=profile.hp.max).contains(&stats.max_hp));
                    assert!((profile.fury.0..=profile.fury.1).contains(&stats.fury));
                    assert_eq!(stats.ambush, stats.archetype == MonsterArchetype::Wraith);
                }
                CardKind::Weapon(durability) | CardKind::Shield(durability) => {
                    assert!((1..=3).contains(&durability.max_durability));
                }
                CardKind::Potion => assert!((3..=8).contains(&card.value)),
                _ => {}
            }
        }
    }

    #[test]
    fn same_seed_same_order() {
        let config = DeckConfig::default();
        let first = create_deck(&config, &mut SmallRng::seed_from_u64(42));
        let second = create_deck(&config, &mut SmallRng::seed_from_u64(42));
        assert_eq!(first, second);
    }

    #[test]
    fn empty_composition_gives_catalog_only() {
        let config = DeckConfig {
            monsters_per_archetype: 0,
            weapons: 0,
            shields: 0,
            potions: 0,
            ..DeckConfig::default()
        };
        let deck = create_deck(&config, &mut SmallRng::seed_from_u64(1));
        assert_eq!(deck.len(), 25);
    }
}
