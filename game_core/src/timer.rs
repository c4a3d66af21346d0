// Countdown scheduling. The session arms and cancels timers explicitly on
// every phase change; the host only fires ticks tagged with the timer id.

use js_sys::Function;
use wasm_bindgen::JsValue;

/// Identifies one armed countdown. Ticks carrying an older id are stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct TimerId(u32);

impl TimerId {
    pub fn new(id: u32) -> Self {
        TimerId(id)
    }

    pub fn as_u32(&self) -> u32 {
        self.0
    }

    pub fn next(&self) -> Self {
        TimerId(self.0.wrapping_add(1))
    }
}

/// Arms and cancels the periodic tick source.
///
/// At most one timer is live per session: the controller always cancels the
/// previous id before starting a new one.
pub trait TickScheduler {
    fn start(&mut self, timer: TimerId, interval_ms: u32);
    fn cancel(&mut self, timer: TimerId);
}

/// For hosts that call `tick` themselves (tests, headless replays).
#[derive(Debug, Default)]
pub struct NoopScheduler;

impl TickScheduler for NoopScheduler {
    fn start(&mut self, _timer: TimerId, _interval_ms: u32) {}

    fn cancel(&mut self, _timer: TimerId) {}
}

/// Delegates to JS callbacks wrapping `setInterval` / `clearInterval`.
///
/// `start(id, ms)` is expected to schedule `game.tick(id)` every `ms`
/// milliseconds; `cancel(id)` clears it. The JS event loop serializes ticks
/// with answer submissions, so the controller never runs reentrantly.
pub struct JsIntervalScheduler {
    start: Function,
    cancel: Function,
}

impl JsIntervalScheduler {
    pub fn new(start: Function, cancel: Function) -> Self {
        JsIntervalScheduler { start, cancel }
    }
}

impl TickScheduler for JsIntervalScheduler {
    fn start(&mut self, timer: TimerId, interval_ms: u32) {
        let result = self.start.call2(
            &JsValue::NULL,
            &JsValue::from(timer.as_u32()),
            &JsValue::from(interval_ms),
        );
        if let Err(err) = result {
            tracing::error!(timer = timer.as_u32(), "failed to start countdown: {:?}", err);
        }
    }

    fn cancel(&mut self, timer: TimerId) {
        if let Err(err) = self.cancel.call1(&JsValue::NULL, &JsValue::from(timer.as_u32())) {
            tracing::warn!(timer = timer.as_u32(), "failed to cancel countdown: {:?}", err);
        }
    }
}
