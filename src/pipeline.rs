//! Effect chains: a base frame source wrapped by signal-driven effect stages.
//!
//! Stages live in an ordered arena; evaluating the chain at `t` pulls the base
//! frame and folds it through stage 0, 1, ... in order. Nothing is computed
//! until a frame is requested.

use image::RgbImage;

use crate::align::AlignedSignal;
use crate::effects::Effect;
use crate::media::{FrameSource, SourceError};

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("No aligned signal has an entry at t = {0:.6}s")]
    UnalignedTimestamp(f64),
}

/// What to do when a requested time has no aligned entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LookupMode {
    /// Missing entries pass the frame through untouched.
    #[default]
    Lenient,
    /// A time missing from every stage's signal is an error.
    Strict,
}

/// One effect plus the signal that drives it.
pub struct EffectStage {
    pub effect: Box<dyn Effect>,
    pub signal: AlignedSignal,
}

impl EffectStage {
    pub fn new(effect: Box<dyn Effect>, signal: AlignedSignal) -> Self {
        Self { effect, signal }
    }

    /// Apply this stage to `frame` at `t`. Missing or zero signal is a no-op.
    pub fn apply(&self, frame: RgbImage, t: f64) -> RgbImage {
        match self.signal.get(t) {
            Some(value) if value > 0.0 => self.effect.apply(&frame, value),
            _ => frame,
        }
    }
}

pub struct EffectChain<S> {
    base: S,
    stages: Vec<EffectStage>,
    mode: LookupMode,
}

/// Wrap `base` with `stages`, applied in the given order.
pub fn compose<S: FrameSource>(base: S, stages: Vec<EffectStage>, mode: LookupMode) -> EffectChain<S> {
    EffectChain { base, stages, mode }
}

impl<S: FrameSource> EffectChain<S> {
    pub fn stages(&self) -> &[EffectStage] {
        &self.stages
    }

    pub fn mode(&self) -> LookupMode {
        self.mode
    }

    /// The frame at `t` after the first `depth` stages (0 = base frame).
    pub fn frame_through(&mut self, depth: usize, t: f64) -> Result<RgbImage, SourceError> {
        let depth = depth.min(self.stages.len());
        if self.mode == LookupMode::Strict
            && !self.stages.is_empty()
            && !self.stages.iter().any(|stage| stage.signal.contains(t))
        {
            return Err(PipelineError::UnalignedTimestamp(t).into());
        }

        let base = self.base.frame_at(t)?;
        Ok(self.stages[..depth]
            .iter()
            .fold(base, |frame, stage| stage.apply(frame, t)))
    }
}

impl<S: FrameSource> FrameSource for EffectChain<S> {
    fn dimensions(&self) -> (u32, u32) {
        self.base.dimensions()
    }

    fn frame_at(&mut self, t: f64) -> Result<RgbImage, SourceError> {
        self.frame_through(self.stages.len(), t)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effects::test_support::pattern;
    use crate::effects::{ChromaticAberration, Zoom};
    use crate::media::StillImage;
    use std::cell::Cell;
    use std::rc::Rc;

    struct CountingSource {
        frame: RgbImage,
        calls: Rc<Cell<usize>>,
    }

    impl FrameSource for CountingSource {
        fn dimensions(&self) -> (u32, u32) {
            self.frame.dimensions()
        }

        fn frame_at(&mut self, _t: f64) -> Result<RgbImage, SourceError> {
            self.calls.set(self.calls.get() + 1);
            Ok(self.frame.clone())
        }
    }

    fn signal(pairs: &[(f64, f32)]) -> AlignedSignal {
        AlignedSignal::from_pairs("test", pairs.to_vec())
    }

    fn chromatic(values: &[(f64, f32)]) -> EffectStage {
        EffectStage::new(Box::new(ChromaticAberration::new(8.0)), signal(values))
    }

    fn zoom(values: &[(f64, f32)]) -> EffectStage {
        EffectStage::new(Box::new(Zoom::new(0.5)), signal(values))
    }

    #[test]
    fn test_order_is_significant() {
        let frame = pattern(64, 48);
        let at = [(0.0, 1.0)];

        let mut a_then_b = compose(
            StillImage::new(frame.clone()),
            vec![chromatic(&at), zoom(&at)],
            LookupMode::Lenient,
        );
        let mut b_then_a = compose(
            StillImage::new(frame),
            vec![zoom(&at), chromatic(&at)],
            LookupMode::Lenient,
        );
        assert_ne!(a_then_b.frame_at(0.0).unwrap(), b_then_a.frame_at(0.0).unwrap());
    }

    #[test]
    fn test_chain_matches_manual_fold() {
        let frame = pattern(40, 40);
        let mut chain = compose(
            StillImage::new(frame.clone()),
            vec![chromatic(&[(0.5, 0.5)]), zoom(&[(0.5, 0.8)])],
            LookupMode::Lenient,
        );
        let expected = Zoom::new(0.5).apply(&ChromaticAberration::new(8.0).apply(&frame, 0.5), 0.8);
        assert_eq!(chain.frame_at(0.5).unwrap(), expected);
        assert_eq!(chain.frame_through(0, 0.5).unwrap(), frame);
    }

    #[test]
    fn test_missing_timestamp_passes_through() {
        let frame = pattern(32, 32);
        let mut chain = compose(
            StillImage::new(frame.clone()),
            vec![chromatic(&[(0.0, 1.0), (1.0 / 30.0, 1.0)])],
            LookupMode::Lenient,
        );
        // Near but not equal to a key: exact lookup misses
        assert_eq!(chain.frame_at(0.0333).unwrap(), frame);
        assert_ne!(chain.frame_at(1.0 / 30.0).unwrap(), frame);
    }

    #[test]
    fn test_zero_signal_passes_through() {
        let frame = pattern(32, 32);
        let mut chain = compose(
            StillImage::new(frame.clone()),
            vec![chromatic(&[(0.0, 0.0)]), zoom(&[(0.0, 0.0)])],
            LookupMode::Strict,
        );
        assert_eq!(chain.frame_at(0.0).unwrap(), frame);
    }

    #[test]
    fn test_strict_mode_rejects_unaligned_time() {
        let mut chain = compose(
            StillImage::new(pattern(8, 8)),
            vec![chromatic(&[(0.0, 1.0)])],
            LookupMode::Strict,
        );
        assert!(chain.frame_at(0.0).is_ok());
        let err = chain.frame_at(0.25).unwrap_err();
        assert!(matches!(
            err,
            SourceError::Pipeline(PipelineError::UnalignedTimestamp(t)) if t == 0.25
        ));
    }

    #[test]
    fn test_compose_is_lazy() {
        let calls = Rc::new(Cell::new(0));
        let source = CountingSource {
            frame: pattern(8, 8),
            calls: Rc::clone(&calls),
        };
        let mut chain = compose(source, vec![zoom(&[(0.0, 1.0)])], LookupMode::Lenient);
        assert_eq!(calls.get(), 0);
        assert_eq!(chain.dimensions(), (8, 8));
        chain.frame_at(0.0).unwrap();
        assert_eq!(calls.get(), 1);
    }
}
