//! Viewport: single source of truth for graph↔screen↔clip coordinates.

use glam::{Mat4, Vec2};

/// `std140`-compatible uniform block shared by every shader.
/// 80 bytes total.
#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
pub struct ViewportUniforms {
    pub transform_col0: [f32; 4],
    pub transform_col1: [f32; 4],
    pub transform_col2: [f32; 4],
    pub screen_size: [f32; 2],
    pub scale: f32,
    pub inv_scale: f32,
    pub _pad: [f32; 2],
}

impl Default for ViewportUniforms {
    fn default() -> Self {
        Self {
            transform_col0: [1.0, 0.0, 0.0, 0.0],
            transform_col1: [0.0, 1.0, 0.0, 0.0],
            transform_col2: [0.0, 0.0, 1.0, 0.0],
            screen_size: [0.0, 0.0],
            scale: 1.0,
            inv_scale: 1.0,
            _pad: [0.0, 0.0],
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Viewport {
    pub centre: Vec2,
    pub scale: f32,
    pub scale_min: f32,
    pub scale_max: f32,
    pub extent: Vec2,
    pub dpr: f32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            centre: Vec2::ZERO,
            scale: 1.0,
            scale_min: 0.01,
            scale_max: 100.0,
            extent: Vec2::new(1.0, 1.0),
            dpr: 1.0,
        }
    }
}

impl Viewport {
    pub fn resize(&mut self, width: f32, height: f32) {
        self.extent = Vec2::new(width.max(1.0), height.max(1.0));
    }

    /// `screenToGraph(p) = (p − ½·extent)/s + centre`.
    pub fn screen_to_graph(&self, p: Vec2) -> Vec2 {
        (p - self.extent * 0.5) / self.scale + self.centre
    }

    /// `graphToScreen(p) = (p − centre)·s + ½·extent`.
    pub fn graph_to_screen(&self, p: Vec2) -> Vec2 {
        (p - self.centre) * self.scale + self.extent * 0.5
    }

    /// Pan by a delta expressed in graph units: `panScreen(dx,dy)` divides
    /// by scale first.
    pub fn pan_screen(&mut self, dx: f32, dy: f32) {
        self.centre -= Vec2::new(dx, dy) / self.scale;
    }

    pub fn pan_graph(&mut self, delta: Vec2) {
        self.centre -= delta;
    }

    /// Zoom with a pivot screen point, preserving the graph point under
    /// that pixel, after clamping the new scale.
    pub fn zoom_at(&mut self, pivot_screen: Vec2, factor: f32) {
        let graph_under_pivot = self.screen_to_graph(pivot_screen);
        self.scale = (self.scale * factor).clamp(self.scale_min, self.scale_max);
        let new_screen = self.graph_to_screen(graph_under_pivot);
        let correction = (pivot_screen - new_screen) / self.scale;
        self.centre -= correction;
    }

    /// Fit the content AABB into the viewport with padding, clamped scale.
    pub fn fit_to_view(&mut self, aabb_min: Vec2, aabb_max: Vec2, padding: f32) {
        let size = (aabb_max - aabb_min).max(Vec2::splat(1e-6));
        let padded_extent = self.extent - Vec2::splat(padding * 2.0);
        let sx = padded_extent.x / size.x;
        let sy = padded_extent.y / size.y;
        self.scale = sx.min(sy).clamp(self.scale_min, self.scale_max);
        self.centre = (aabb_min + aabb_max) * 0.5;
    }

    /// `graphToClip = (screen-to-clip) ∘ (graph-to-screen)`, Y flipped for
    /// the target NDC convention.
    pub fn graph_to_clip_matrix(&self) -> Mat4 {
        // graph -> screen: scale then translate (screen = (p - centre)*s + extent/2)
        // screen -> clip: x' = 2x/w - 1, y' = 1 - 2y/h  (Y flip)
        let s = self.scale;
        let w = self.extent.x;
        let h = self.extent.y;

        let sx = 2.0 * s / w;
        let sy = -2.0 * s / h;
        let tx = -2.0 * s * self.centre.x / w + 1.0;
        let ty = 2.0 * s * self.centre.y / h + 1.0;

        Mat4::from_cols_array(&[
            sx, 0.0, 0.0, 0.0, //
            0.0, sy, 0.0, 0.0, //
            0.0, 0.0, 1.0, 0.0, //
            tx, ty, 0.0, 1.0,
        ])
    }

    pub fn uniforms(&self) -> ViewportUniforms {
        // `graph_to_clip_matrix` is a 4x4 matrix but the transform it encodes
        // is a 2D affine map with no rotation: column 2 is always the
        // untouched identity z-column, so only columns 0, 1 and the
        // translation column (3) carry information. Pack those three into
        // the uniform block's three `vec4` slots rather than the raw
        // column-major layout, or shaders would have no way to recover the
        // pan offset that column 3 holds.
        let m = self.graph_to_clip_matrix();
        let cols = m.to_cols_array_2d();
        ViewportUniforms {
            transform_col0: cols[0],
            transform_col1: cols[1],
            transform_col2: cols[3],
            screen_size: self.extent.into(),
            scale: self.scale,
            inv_scale: 1.0 / self.scale,
            _pad: [0.0, 0.0],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_screen_graph_screen() {
        let mut vp = Viewport::default();
        vp.resize(1920.0, 1080.0);
        vp.scale = 2.3;
        vp.centre = Vec2::new(13.0, -7.0);

        for &(sx, sy) in &[(0.0, 0.0), (1920.0, 1080.0), (960.0, 540.0), (1.0, 1079.0)] {
            let p = Vec2::new(sx, sy);
            let g = vp.screen_to_graph(p);
            let back = vp.graph_to_screen(g);
            assert!((back - p).length() <= 1e-4 * p.length().max(1.0));
        }
    }

    #[test]
    fn zoom_preserves_pivot() {
        let mut vp = Viewport::default();
        vp.resize(800.0, 600.0);
        let pivot = Vec2::new(200.0, 150.0);
        let graph_before = vp.screen_to_graph(pivot);
        vp.zoom_at(pivot, 1.5);
        let graph_after = vp.screen_to_graph(pivot);
        assert!((graph_before - graph_after).length() < 1e-3);
    }

    #[test]
    fn fit_to_view_clamps_scale() {
        let mut vp = Viewport::default();
        vp.resize(100.0, 100.0);
        vp.scale_max = 2.0;
        vp.fit_to_view(Vec2::ZERO, Vec2::splat(1.0), 0.0);
        assert!(vp.scale <= 2.0);
    }
}
