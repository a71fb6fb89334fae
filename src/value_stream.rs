//! Value streams: named `NodeIndex → f32` pure data pipes bound to the
//! density/heatmap/contour/metaball layers.
//!
//! A side-table keyed by the same dense id as the main node table,
//! generalized from a bitflag side-table to an arbitrary sparse `f32`
//! side-table plus a colour scale.

use crate::ids::NodeIndex;
use slotmap::SecondaryMap;
use std::collections::HashMap;

/// A piecewise-linear colour scale over a value domain. Stops are sorted by
/// value ascending; sampling outside the domain clamps to the nearest stop.
#[derive(Debug, Clone)]
pub struct ColorScale {
    domain: (f32, f32),
    stops: Vec<(f32, [f32; 4])>,
}

impl ColorScale {
    /// `stops` need not be pre-sorted; `domain` bounds the input value
    /// before lookup.
    pub fn new(domain: (f32, f32), mut stops: Vec<(f32, [f32; 4])>) -> Self {
        stops.sort_by(|a, b| a.0.total_cmp(&b.0));
        Self { domain, stops }
    }

    pub fn sample(&self, value: f32) -> [f32; 4] {
        let v = value.clamp(self.domain.0, self.domain.1);
        match self.stops.as_slice() {
            [] => [0.0, 0.0, 0.0, 0.0],
            [(_, c)] => *c,
            stops => {
                if v <= stops[0].0 {
                    return stops[0].1;
                }
                if v >= stops[stops.len() - 1].0 {
                    return stops[stops.len() - 1].1;
                }
                for w in stops.windows(2) {
                    let (v0, c0) = w[0];
                    let (v1, c1) = w[1];
                    if v >= v0 && v <= v1 {
                        let t = if v1 > v0 { (v - v0) / (v1 - v0) } else { 0.0 };
                        let mut out = [0.0; 4];
                        for i in 0..4 {
                            out[i] = c0[i] + (c1[i] - c0[i]) * t;
                        }
                        return out;
                    }
                }
                stops[stops.len() - 1].1
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlendMode {
    Additive,
    Multiply,
    Replace,
    Max,
}

impl BlendMode {
    fn combine(self, acc: f32, v: f32) -> f32 {
        match self {
            BlendMode::Additive => acc + v,
            BlendMode::Multiply => acc * v,
            BlendMode::Replace => v,
            BlendMode::Max => acc.max(v),
        }
    }

    fn identity(self) -> f32 {
        match self {
            BlendMode::Additive => 0.0,
            BlendMode::Multiply => 1.0,
            BlendMode::Replace => 0.0,
            BlendMode::Max => f32::MIN,
        }
    }
}

/// A single named stream: a sparse `f32` side-table over node indices plus
/// the colour scale used when a layer samples it.
pub struct ValueStream {
    pub name: String,
    values: SecondaryMap<NodeIndex, f32>,
    pub scale: ColorScale,
}

impl ValueStream {
    pub fn new(name: impl Into<String>, scale: ColorScale) -> Self {
        Self {
            name: name.into(),
            values: SecondaryMap::new(),
            scale,
        }
    }

    pub fn set(&mut self, idx: NodeIndex, value: f32) {
        self.values.insert(idx, value);
    }

    pub fn set_many(&mut self, pairs: impl IntoIterator<Item = (NodeIndex, f32)>) {
        for (idx, v) in pairs {
            self.values.insert(idx, v);
        }
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }

    pub fn get(&self, idx: NodeIndex) -> Option<f32> {
        self.values.get(idx).copied()
    }

    pub fn color(&self, idx: NodeIndex) -> Option<[f32; 4]> {
        self.get(idx).map(|v| self.scale.sample(v))
    }
}

/// Owns the set of named streams a running engine exposes to layers.
#[derive(Default)]
pub struct ValueStreamRegistry {
    streams: HashMap<String, ValueStream>,
}

impl ValueStreamRegistry {
    pub fn register(&mut self, stream: ValueStream) {
        self.streams.insert(stream.name.clone(), stream);
    }

    pub fn unregister(&mut self, name: &str) -> Option<ValueStream> {
        self.streams.remove(name)
    }

    pub fn get(&self, name: &str) -> Option<&ValueStream> {
        self.streams.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut ValueStream> {
        self.streams.get_mut(name)
    }

    /// Compose several named streams for one node under a single
    /// configurable blend mode. Streams missing a value for `idx` are
    /// skipped rather than treated as zero, so a gap in one stream doesn't
    /// zero out a `Multiply` blend.
    pub fn compose(&self, names: &[&str], mode: BlendMode, idx: NodeIndex) -> f32 {
        let mut acc = mode.identity();
        let mut any = false;
        for &name in names {
            if let Some(v) = self.streams.get(name).and_then(|s| s.get(idx)) {
                acc = mode.combine(acc, v);
                any = true;
            }
        }
        if any {
            acc
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::SlotMap;

    fn sample_index() -> NodeIndex {
        let mut sm: SlotMap<NodeIndex, ()> = SlotMap::with_key();
        sm.insert(())
    }

    #[test]
    fn color_scale_interpolates_and_clamps() {
        let scale = ColorScale::new(
            (0.0, 10.0),
            vec![(0.0, [0.0, 0.0, 0.0, 1.0]), (10.0, [1.0, 1.0, 1.0, 1.0])],
        );
        assert_eq!(scale.sample(-5.0), [0.0, 0.0, 0.0, 1.0]);
        assert_eq!(scale.sample(15.0), [1.0, 1.0, 1.0, 1.0]);
        let mid = scale.sample(5.0);
        assert!((mid[0] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn compose_additive_and_multiply() {
        let idx = sample_index();
        let mut reg = ValueStreamRegistry::default();
        let scale = ColorScale::new((0.0, 1.0), vec![(0.0, [0.0; 4]), (1.0, [1.0; 4])]);
        let mut a = ValueStream::new("a", scale.clone());
        a.set(idx, 2.0);
        let mut b = ValueStream::new("b", scale);
        b.set(idx, 3.0);
        reg.register(a);
        reg.register(b);

        assert_eq!(reg.compose(&["a", "b"], BlendMode::Additive, idx), 5.0);
        assert_eq!(reg.compose(&["a", "b"], BlendMode::Multiply, idx), 6.0);
        assert_eq!(reg.compose(&["a", "b"], BlendMode::Max, idx), 3.0);
        assert_eq!(reg.compose(&["b"], BlendMode::Replace, idx), 3.0);
    }

    #[test]
    fn missing_stream_value_is_skipped_not_zero() {
        let idx = sample_index();
        let mut reg = ValueStreamRegistry::default();
        let scale = ColorScale::new((0.0, 1.0), vec![(0.0, [0.0; 4]), (1.0, [1.0; 4])]);
        let mut a = ValueStream::new("a", scale);
        a.set(idx, 4.0);
        reg.register(a);
        assert_eq!(reg.compose(&["a", "missing"], BlendMode::Multiply, idx), 4.0);
    }
}
