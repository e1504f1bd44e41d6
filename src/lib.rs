pub mod config;
pub mod game;
pub mod logging;

use std::cell::RefCell;
use std::rc::Rc;

use gloo_timers::future::TimeoutFuture;
use rand::rngs::SmallRng;
use rand::SeedableRng;
use serde_wasm_bindgen::{from_value, to_value};
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::future_to_promise;
use web_sys::js_sys::Promise;

pub use config::{ConfigError, DeckConfig, GameConfig, RulesConfig};
pub use game::{
    create_deck, Card, CardId, Command, GameEvent, GameOutcome, GameState, MoveTarget, RuleEngine,
    RuleError, RuleResolution, Snapshot, SnapshotError, Zone, SNAPSHOT_VERSION,
};

#[cfg(feature = "wee_alloc")]
#[global_allocator]
static ALLOC: wee_alloc::WeeAlloc = wee_alloc::WeeAlloc::INIT;

#[wasm_bindgen(start)]
pub fn start() {
    set_panic_hook();
    logging::init(None);
}

fn to_js_error(error: RuleError) -> JsValue {
    to_value(&error).unwrap_or_else(|_| JsValue::from_str(&error.to_string()))
}

fn serde_to_js_error<E: std::fmt::Display>(error: E) -> JsValue {
    JsValue::from_str(&error.to_string())
}

fn make_resolution_json(resolution: RuleResolution) -> Result<String, JsValue> {
    serde_json::to_string(&resolution).map_err(serde_to_js_error)
}

fn events_json(events: &[GameEvent]) -> Result<String, JsValue> {
    serde_json::to_string(events).map_err(serde_to_js_error)
}

fn parse_config(config_json: Option<String>) -> Result<GameConfig, JsValue> {
    match config_json {
        Some(json) => GameConfig::from_json(&json).map_err(serde_to_js_error),
        None => Ok(GameConfig::default()),
    }
}

#[wasm_bindgen]
pub struct GameEngine {
    state: Rc<RefCell<GameState>>,
    engine: RuleEngine,
    config: GameConfig,
}

impl GameEngine {
    fn state_mut(&self) -> Result<std::cell::RefMut<'_, GameState>, JsValue> {
        self.state.try_borrow_mut().map_err(serde_to_js_error)
    }

    fn state_ref(&self) -> Result<std::cell::Ref<'_, GameState>, JsValue> {
        self.state.try_borrow().map_err(serde_to_js_error)
    }

    fn run(&mut self, command: Command) -> Result<RuleResolution, JsValue> {
        let mut state = self.state.try_borrow_mut().map_err(serde_to_js_error)?;
        let events = self
            .engine
            .apply(&mut state, command)
            .map_err(to_js_error)?;
        Ok(RuleResolution::new(state.clone(), events))
    }
}

#[wasm_bindgen]
impl GameEngine {
    /// 开始一局游戏。传入 `seed` 可复现洗牌结果。
    #[wasm_bindgen(constructor)]
    pub fn new(config_json: Option<String>, seed: Option<u64>) -> Result<GameEngine, JsValue> {
        let config = parse_config(config_json)?;
        if config.log_level.is_some() {
            logging::init(config.log_level.as_deref());
        }
        let mut engine = match seed {
            Some(seed) => RuleEngine::with_seed(seed),
            None => RuleEngine::new(),
        };
        let (state, _) = engine.new_game(&config);
        Ok(GameEngine {
            state: Rc::new(RefCell::new(state)),
            engine,
            config,
        })
    }

    /// 丢弃当前对局并重新开局。
    pub fn restart(&mut self) -> Result<String, JsValue> {
        let (state, events) = self.engine.new_game(&self.config);
        *self.state_mut()? = state.clone();
        make_resolution_json(RuleResolution::new(state, events))
    }

    pub fn state_json(&self) -> Result<String, JsValue> {
        serde_json::to_string(&*self.state_ref()?).map_err(serde_to_js_error)
    }

    pub fn state(&self) -> Result<JsValue, JsValue> {
        to_value(&*self.state_ref()?).map_err(JsValue::from)
    }

    pub fn snapshot_json(&self) -> Result<String, JsValue> {
        self.state_ref()?
            .snapshot()
            .to_json()
            .map_err(serde_to_js_error)
    }

    pub fn load_snapshot_json(&mut self, json: &str) -> Result<(), JsValue> {
        let snapshot = Snapshot::from_json(json).map_err(serde_to_js_error)?;
        let state = GameState::hydrate(snapshot).map_err(serde_to_js_error)?;
        self.config.rules = state.rules.clone();
        *self.state_mut()? = state;
        Ok(())
    }

    pub fn apply_command_json(&mut self, command_json: &str) -> Result<String, JsValue> {
        let command: Command = serde_json::from_str(command_json).map_err(serde_to_js_error)?;
        make_resolution_json(self.run(command)?)
    }

    pub fn apply_command(&mut self, command: JsValue) -> Result<JsValue, JsValue> {
        let command: Command = from_value(command).map_err(JsValue::from)?;
        to_value(&self.run(command)?).map_err(JsValue::from)
    }

    pub fn max_hp(&self) -> Result<i32, JsValue> {
        Ok(self.state_ref()?.max_hp())
    }

    pub fn attack_bonus(&self) -> Result<i32, JsValue> {
        Ok(self.state_ref()?.attack_bonus())
    }

    pub fn defense_bonus(&self) -> Result<i32, JsValue> {
        Ok(self.state_ref()?.defense_bonus())
    }

    /// 卡牌移除动画开始时调用。
    pub fn hold_removal(&mut self) -> Result<(), JsValue> {
        self.state_mut()?.hold_removal();
        Ok(())
    }

    /// 移除动画结束时调用，返回等待中的下落所产生的事件。
    pub fn release_removal(&mut self) -> Result<String, JsValue> {
        let events = self.state_mut()?.release_removal();
        events_json(&events)
    }

    /// `delay_ms` 后释放一次占用，
    /// 用于渲染端没有退场动画的情况。
    pub fn release_removal_after(&self, delay_ms: u32) -> Promise {
        let state = Rc::clone(&self.state);
        future_to_promise(async move {
            if delay_ms > 0 {
                TimeoutFuture::new(delay_ms).await;
            }
            let events = state
                .try_borrow_mut()
                .map_err(serde_to_js_error)?
                .release_removal();
            Ok(JsValue::from_str(&events_json(&events)?))
        })
    }
}

/// 只构建洗好的牌库，不开局。
#[wasm_bindgen(js_name = "createDeck")]
pub fn create_deck_js(config_json: Option<String>, seed: Option<u64>) -> Result<JsValue, JsValue> {
    let config = parse_config(config_json)?;
    let mut rng = match seed {
        Some(seed) => SmallRng::seed_from_u64(seed),
        None => SmallRng::from_entropy(),
    };
    to_value(&create_deck(&config.deck, &mut rng)).map_err(JsValue::from)
}

/// 校验存档但不加载。
#[wasm_bindgen(js_name = "validateSnapshot")]
pub fn validate_snapshot(json: &str) -> Result<(), JsValue> {
    let snapshot = Snapshot::from_json(json).map_err(serde_to_js_error)?;
    GameState::hydrate(snapshot).map_err(serde_to_js_error)?;
    Ok(())
}

#[wasm_bindgen(js_name = "snapshotVersion")]
pub fn snapshot_version() -> u32 {
    SNAPSHOT_VERSION
}

#[cfg(feature = "console_error_panic_hook")]
fn set_panic_hook() {
    console_error_panic_hook::set_once();
}

#[cfg(not(feature = "console_error_panic_hook"))]
fn set_panic_hook() {}
