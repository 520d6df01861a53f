//! Browser implementations of the core host traits.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use horizon_core::governor::{QualityLevel, QualitySettings};
use horizon_core::host::{FrameHandle, FrameHost, RenderSurface, TimerHost, TimerId, TimerKind, UserNotifier};
use horizon_core::recovery::Notice;
use horizon_core::Application;
use js_sys::{Function, Object, Reflect};
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;

/// Late-bound pointer to the application the callbacks drive. Filled in
/// once the application has been wrapped in its `Rc`.
pub type AppSlot = Rc<RefCell<Weak<RefCell<Application>>>>;

fn with_app(slot: &AppSlot, f: impl FnOnce(&mut Application)) {
    let app = slot.borrow().upgrade();
    let Some(app) = app else {
        return;
    };
    match app.try_borrow_mut() {
        Ok(mut app) => f(&mut app),
        Err(_) => log::warn!("application busy, callback dropped"),
    };
}

// ─── requestAnimationFrame ───────────────────────────────────────

pub struct WebFrames {
    window: web_sys::Window,
    callback: Closure<dyn FnMut(f64)>,
}

impl WebFrames {
    pub fn new(window: web_sys::Window, slot: AppSlot) -> Self {
        let callback = Closure::wrap(Box::new(move |now: f64| {
            with_app(&slot, |app| app.frame(now));
        }) as Box<dyn FnMut(f64)>);
        Self { window, callback }
    }
}

impl FrameHost for WebFrames {
    fn request_frame(&mut self) -> FrameHandle {
        let handle = self
            .window
            .request_animation_frame(self.callback.as_ref().unchecked_ref())
            .unwrap_or_else(|err| {
                log::error!("requestAnimationFrame failed: {:?}", err);
                0
            });
        FrameHandle(handle)
    }

    fn cancel_frame(&mut self, handle: FrameHandle) {
        if let Err(err) = self.window.cancel_animation_frame(handle.0) {
            log::warn!("cancelAnimationFrame failed: {:?}", err);
        }
    }
}

// ─── setTimeout ──────────────────────────────────────────────────

/// Timers backed by `setTimeout`.
///
/// A closure cannot be dropped while it runs, so fired and cancelled timers
/// are retired and their closures freed on the next `schedule` call.
pub struct WebTimers {
    window: web_sys::Window,
    slot: AppSlot,
    next_id: u32,
    live: HashMap<TimerId, (i32, Closure<dyn FnMut()>)>,
    retired: Rc<RefCell<Vec<TimerId>>>,
}

impl WebTimers {
    pub fn new(window: web_sys::Window, slot: AppSlot) -> Self {
        Self {
            window,
            slot,
            next_id: 0,
            live: HashMap::new(),
            retired: Rc::default(),
        }
    }

    fn purge(&mut self) {
        for id in self.retired.borrow_mut().drain(..) {
            self.live.remove(&id);
        }
    }
}

impl TimerHost for WebTimers {
    fn schedule(&mut self, kind: TimerKind, delay_ms: u32) -> TimerId {
        self.purge();
        self.next_id = self.next_id.wrapping_add(1);
        let id = TimerId(self.next_id);

        let slot = self.slot.clone();
        let retired = self.retired.clone();
        let callback = Closure::wrap(Box::new(move || {
            with_app(&slot, |app| app.on_timer(id));
            retired.borrow_mut().push(id);
        }) as Box<dyn FnMut()>);

        let delay = i32::try_from(delay_ms).unwrap_or(i32::MAX);
        match self
            .window
            .set_timeout_with_callback_and_timeout_and_arguments_0(callback.as_ref().unchecked_ref(), delay)
        {
            Ok(handle) => {
                log::debug!("{:?} timer {:?} in {}ms", kind, id, delay_ms);
                self.live.insert(id, (handle, callback));
            }
            Err(err) => log::error!("setTimeout failed for {:?}: {:?}", kind, err),
        }
        id
    }

    fn cancel(&mut self, id: TimerId) {
        if let Some((handle, _)) = self.live.get(&id) {
            self.window.clear_timeout_with_handle(*handle);
            self.retired.borrow_mut().push(id);
        }
    }
}

// ─── JavaScript hooks ────────────────────────────────────────────

/// Optional callbacks supplied by the page:
///
/// ```js
/// {
///   probeHealth() -> bool,
///   recreateSurface(),
///   rebuildResources(),
///   applyQuality(level, { pixelRatioCap, lensing, bloom, maxSubsteps }),
///   showNotice(kind),
///   clearNotice(),
/// }
/// ```
///
/// Missing entries are skipped. A throwing hook is logged and ignored.
#[derive(Clone, Default)]
pub struct JsHooks {
    probe_health: Option<Function>,
    recreate_surface: Option<Function>,
    rebuild_resources: Option<Function>,
    apply_quality: Option<Function>,
    show_notice: Option<Function>,
    clear_notice: Option<Function>,
}

impl JsHooks {
    pub fn from_object(hooks: &Object) -> Self {
        let get = |name: &str| {
            Reflect::get(hooks, &JsValue::from_str(name))
                .ok()
                .and_then(|value| value.dyn_into::<Function>().ok())
        };
        Self {
            probe_health: get("probeHealth"),
            recreate_surface: get("recreateSurface"),
            rebuild_resources: get("rebuildResources"),
            apply_quality: get("applyQuality"),
            show_notice: get("showNotice"),
            clear_notice: get("clearNotice"),
        }
    }
}

fn call(hook: &Option<Function>, name: &str, args: &[JsValue]) -> Option<JsValue> {
    let hook = hook.as_ref()?;
    let result = match args {
        [] => hook.call0(&JsValue::NULL),
        [a] => hook.call1(&JsValue::NULL, a),
        [a, b] => hook.call2(&JsValue::NULL, a, b),
        _ => hook.apply(&JsValue::NULL, &args.iter().collect::<js_sys::Array>()),
    };
    result
        .map_err(|err| log::warn!("{name} hook threw: {:?}", err))
        .ok()
}

pub fn quality_name(level: QualityLevel) -> &'static str {
    match level {
        QualityLevel::High => "high",
        QualityLevel::Medium => "medium",
        QualityLevel::Low => "low",
    }
}

fn settings_object(settings: &QualitySettings) -> JsValue {
    let object = Object::new();
    let fields: [(&str, JsValue); 4] = [
        ("pixelRatioCap", JsValue::from_f64(settings.pixel_ratio_cap as f64)),
        ("lensing", JsValue::from_bool(settings.lensing_enabled)),
        ("bloom", JsValue::from_bool(settings.bloom_enabled)),
        ("maxSubsteps", JsValue::from_f64(settings.max_substeps as f64)),
    ];
    for (key, value) in fields {
        let _ = Reflect::set(&object, &JsValue::from_str(key), &value);
    }
    object.into()
}

pub struct JsSurface(pub JsHooks);

impl RenderSurface for JsSurface {
    fn probe_health(&mut self) -> bool {
        if self.0.probe_health.is_none() {
            return true;
        }
        call(&self.0.probe_health, "probeHealth", &[])
            .and_then(|value| value.as_bool())
            .unwrap_or(false)
    }

    fn request_surface_recreate(&mut self) {
        call(&self.0.recreate_surface, "recreateSurface", &[]);
    }

    fn request_resource_rebuild(&mut self) {
        call(&self.0.rebuild_resources, "rebuildResources", &[]);
    }

    fn apply_quality(&mut self, level: QualityLevel, settings: &QualitySettings) {
        call(
            &self.0.apply_quality,
            "applyQuality",
            &[JsValue::from_str(quality_name(level)), settings_object(settings)],
        );
    }
}

pub struct JsNotifier(pub JsHooks);

impl UserNotifier for JsNotifier {
    fn show(&mut self, notice: Notice) {
        let kind = match notice {
            Notice::ContextLost => "context-lost",
            Notice::ContextFailed => "context-failed",
            Notice::LoopHalted => "loop-halted",
        };
        call(&self.0.show_notice, "showNotice", &[JsValue::from_str(kind)]);
    }

    fn clear(&mut self) {
        call(&self.0.clear_notice, "clearNotice", &[]);
    }
}
