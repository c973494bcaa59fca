//! Transition sampling: turns a [`sig_types::Transition`] plus an elapsed
//! fraction into the opacity/offset values a widget slot should render at
//! right now. There is
//! no real keyframe engine without a DOM, so this is the pure function a
//! host renderer would call once per frame, or — as `sig-player` uses it —
//! sampled a few times across the transition's duration for stats/testing.

use sig_types::{Transition, TransitionKind};

/// `(opacity, dx, dy)` at `progress` (0.0 at transition start, 1.0 at end).
/// `dx`/`dy` are fractions of the region's width/height, matching
/// [`sig_types::TransitionDirection::offset_fraction`]'s convention.
pub fn sample(transition: &Transition, progress: f64) -> (f64, f64, f64) {
    let progress = progress.clamp(0.0, 1.0);
    match transition.kind {
        TransitionKind::FadeIn => (progress, 0.0, 0.0),
        TransitionKind::FadeOut => (1.0 - progress, 0.0, 0.0),
        TransitionKind::FlyIn => {
            let (ox, oy) = transition
                .direction
                .map(|d| d.offset_fraction())
                .unwrap_or((0.0, 0.0));
            (1.0, ox * (1.0 - progress), oy * (1.0 - progress))
        }
        TransitionKind::FlyOut => {
            let (ox, oy) = transition
                .direction
                .map(|d| d.offset_fraction())
                .unwrap_or((0.0, 0.0));
            (1.0, ox * progress, oy * progress)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sig_types::TransitionDirection;

    #[test]
    fn fade_in_ramps_opacity() {
        let t = Transition {
            kind: TransitionKind::FadeIn,
            duration_ms: 500,
            direction: None,
        };
        assert_eq!(sample(&t, 0.0), (0.0, 0.0, 0.0));
        assert_eq!(sample(&t, 1.0), (1.0, 0.0, 0.0));
    }

    #[test]
    fn fly_in_from_north_starts_above() {
        let t = Transition {
            kind: TransitionKind::FlyIn,
            duration_ms: 500,
            direction: Some(TransitionDirection::N),
        };
        let (opacity, dx, dy) = sample(&t, 0.0);
        assert_eq!(opacity, 1.0);
        assert_eq!(dx, 0.0);
        assert_eq!(dy, -1.0);
        let (_, _, dy_end) = sample(&t, 1.0);
        assert_eq!(dy_end, 0.0);
    }
}
