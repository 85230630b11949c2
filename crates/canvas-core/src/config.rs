//! Host-overridable tunables for the canvas engine: a plain struct with a
//! `Default` impl, constructed once and threaded through the components
//! that need it.

use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub struct CanvasConfig {
    /// Entries held per page cache (spec.md §4.F: `K = 6`).
    pub cache_capacity: usize,
    /// Debounce before adjacent-page prefetch starts.
    pub prefetch_debounce: Duration,
    /// Default PDF render DPI (spec.md §4.B).
    pub render_dpi: u32,
    /// Inertia friction factor applied per tick (spec.md §4.G).
    pub inertia_friction: f64,
    /// Inertia stop threshold, canvas-units/ms (spec.md §4.G).
    pub inertia_v_min: f64,
    /// Forward/backward autoscroll switch-zone margin in pixels.
    pub autoscroll_switch_margin: f64,
    /// Cooldown after an autoscroll signal before another may fire.
    pub autoscroll_cooldown: Duration,
    /// Edgeless-mode tile edge length in pixels.
    pub tile_size: u32,
}

impl Default for CanvasConfig {
    fn default() -> Self {
        Self {
            cache_capacity: 6,
            prefetch_debounce: Duration::from_secs(1),
            render_dpi: 192,
            inertia_friction: 0.92,
            inertia_v_min: 0.1,
            autoscroll_switch_margin: 300.0,
            autoscroll_cooldown: Duration::from_millis(500),
            tile_size: 1024,
        }
    }
}
