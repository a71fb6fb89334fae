//! Plain-data configuration structs.
//!
//! No file or JSON loading — the host constructs these directly and passes
//! them to the façade. All `Copy`/`Clone`/`PartialEq` so
//! `set_force_config(c); get_force_config() == c` is a plain field
//! comparison, the same small `Copy` config struct pattern used
//! throughout this crate.

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ForceConfig {
    pub repulsion_strength: f32,
    pub spring_stiffness: f32,
    pub ideal_edge_length: f32,
    pub gravity: f32,
    pub damping: f32,
    pub max_velocity: f32,
    pub theta: f32,
    pub alpha_target: f32,
    pub alpha_decay: f32,
    pub alpha_min: f32,
    pub dt: f32,
}

impl Default for ForceConfig {
    fn default() -> Self {
        Self {
            repulsion_strength: 400.0,
            spring_stiffness: 0.1,
            ideal_edge_length: 60.0,
            gravity: 0.02,
            damping: 0.85,
            max_velocity: 40.0,
            theta: 0.8,
            alpha_target: 0.0,
            alpha_decay: 0.02,
            alpha_min: 0.001,
            dt: 1.0 / 60.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeatmapConfig {
    pub enabled: bool,
    pub opacity: f32,
    pub scale_name: ColorScaleName,
    pub kernel_radius: f32,
    pub intensity: f32,
}

impl Default for HeatmapConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            opacity: 0.8,
            scale_name: ColorScaleName::Viridis,
            kernel_radius: 40.0,
            intensity: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorScaleName {
    Viridis,
    Plasma,
    Magma,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContourConfig {
    pub enabled: bool,
    pub thresholds: [f32; 4],
    pub threshold_count: u8,
    pub line_width: f32,
    pub stroke_color: [f32; 4],
}

impl Default for ContourConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            thresholds: [0.25, 0.5, 0.75, 1.0],
            threshold_count: 4,
            line_width: 1.5,
            stroke_color: [1.0, 1.0, 1.0, 1.0],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetaballConfig {
    pub enabled: bool,
    pub smoothing: f32,
    pub iso_value: f32,
    pub fill_color: [f32; 4],
    pub opacity: f32,
}

impl Default for MetaballConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            smoothing: 0.3,
            iso_value: 0.5,
            fill_color: [0.2, 0.6, 1.0, 1.0],
            opacity: 0.85,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PwmShape {
    Square,
    Triangle,
    Sine,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EdgeFlowConfig {
    pub enabled: bool,
    pub layer1_shape: PwmShape,
    pub layer1_speed: f32,
    pub layer2: Option<(PwmShape, f32, f32)>,
}

impl Default for EdgeFlowConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            layer1_shape: PwmShape::Sine,
            layer1_speed: 1.0,
            layer2: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CurvedEdgesConfig {
    pub enabled: bool,
    pub segments: u32,
    pub weight: f32,
}

impl Default for CurvedEdgesConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            segments: 8,
            weight: 0.25,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TypeStyle {
    pub font_size_px: f32,
    pub color: [f32; 4],
    pub max_visible_width_px: f32,
}

impl Default for TypeStyle {
    fn default() -> Self {
        Self {
            font_size_px: 12.0,
            color: [1.0, 1.0, 1.0, 1.0],
            max_visible_width_px: 160.0,
        }
    }
}

/// Fallback appearance for nodes carrying a given [`crate::graph::TypeTag`]
///. Only fills in fields the caller
/// left unset on the individual node at load/add time — per-item values
/// always win.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NodeStyle {
    pub color: [f32; 4],
    pub radius: f32,
}

/// Fallback appearance for edges carrying a given type tag
/// (`setEdgeTypeStyles`); same per-item-wins precedence as [`NodeStyle`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EdgeStyle {
    pub color: [f32; 4],
    pub width: f32,
}

/// Named shortcuts for [`EdgeFlowConfig`] (`setEdgeFlowPreset`), matching
/// the handful of looks a host typically wants without hand-tuning both
/// PWM layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeFlowPreset {
    /// Slow single sine wave, no second layer.
    Pulse,
    /// Fast triangle wave with a trailing faded second layer.
    Flow,
    /// Fast square wave, high contrast, no second layer.
    Alert,
}

impl EdgeFlowPreset {
    pub fn to_config(self) -> EdgeFlowConfig {
        match self {
            EdgeFlowPreset::Pulse => EdgeFlowConfig {
                enabled: true,
                layer1_shape: PwmShape::Sine,
                layer1_speed: 0.4,
                layer2: None,
            },
            EdgeFlowPreset::Flow => EdgeFlowConfig {
                enabled: true,
                layer1_shape: PwmShape::Triangle,
                layer1_speed: 1.5,
                layer2: Some((PwmShape::Triangle, 1.5, 0.4)),
            },
            EdgeFlowPreset::Alert => EdgeFlowConfig {
                enabled: true,
                layer1_shape: PwmShape::Square,
                layer1_speed: 2.5,
                layer2: None,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LabelsConfig {
    pub enabled: bool,
    pub style: TypeStyle,
    pub collision_grid_cell_px: f32,
    pub max_labels: usize,
}

impl Default for LabelsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            style: TypeStyle::default(),
            collision_grid_cell_px: 24.0,
            max_labels: 256,
        }
    }
}
