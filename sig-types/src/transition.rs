//! Widget/region transitions.
//!
//! XLF never nests a `<transition>` element; the attributes live flattened
//! inside a widget's or region's `<options>` bag (`transIn`, `transInDuration`,
//! `transInDirection`, ...). We reconstruct a typed [`Transition`] from those
//! option strings at parse time so the rest of the codebase never touches
//! raw option keys again (see Design Notes, "Dynamic property access on
//! option maps").

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransitionKind {
    FadeIn,
    FadeOut,
    FlyIn,
    FlyOut,
}

impl TransitionKind {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "fadeIn" => Some(Self::FadeIn),
            "fadeOut" => Some(Self::FadeOut),
            "flyIn" => Some(Self::FlyIn),
            "flyOut" => Some(Self::FlyOut),
            _ => None,
        }
    }

    pub fn is_fly(self) -> bool {
        matches!(self, Self::FlyIn | Self::FlyOut)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransitionDirection {
    N,
    NE,
    E,
    SE,
    S,
    SW,
    W,
    NW,
}

impl TransitionDirection {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "N" => Some(Self::N),
            "NE" => Some(Self::NE),
            "E" => Some(Self::E),
            "SE" => Some(Self::SE),
            "S" => Some(Self::S),
            "SW" => Some(Self::SW),
            "W" => Some(Self::W),
            "NW" => Some(Self::NW),
            _ => None,
        }
    }

    /// Offset (dx, dy), as a fraction of region width/height, that a fly
    /// transition starts from (flyIn) or ends at (flyOut) for this
    /// direction. North is "comes from above" i.e. negative y.
    pub fn offset_fraction(self) -> (f64, f64) {
        match self {
            Self::N => (0.0, -1.0),
            Self::NE => (1.0, -1.0),
            Self::E => (1.0, 0.0),
            Self::SE => (1.0, 1.0),
            Self::S => (0.0, 1.0),
            Self::SW => (-1.0, 1.0),
            Self::W => (-1.0, 0.0),
            Self::NW => (-1.0, -1.0),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    pub kind: TransitionKind,
    pub duration_ms: u32,
    pub direction: Option<TransitionDirection>,
}

impl Transition {
    /// Builds the in/out pair from a widget's or region's flattened option
    /// strings. Returns `(None, None)` if neither side is configured.
    pub fn pair_from_options(
        trans_in: Option<&str>,
        trans_in_duration: Option<&str>,
        trans_in_direction: Option<&str>,
        trans_out: Option<&str>,
        trans_out_duration: Option<&str>,
        trans_out_direction: Option<&str>,
    ) -> (Option<Transition>, Option<Transition>) {
        let make = |kind: Option<&str>, duration: Option<&str>, direction: Option<&str>| {
            let kind = TransitionKind::parse(kind?)?;
            let duration_ms = duration.and_then(|d| d.parse().ok()).unwrap_or(1000);
            let direction = direction.and_then(TransitionDirection::parse);
            Some(Transition {
                kind,
                duration_ms,
                direction,
            })
        };

        (
            make(trans_in, trans_in_duration, trans_in_direction),
            make(trans_out, trans_out_duration, trans_out_direction),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_fly_pair_with_direction() {
        let (inn, out) = Transition::pair_from_options(
            Some("flyIn"),
            Some("500"),
            Some("NE"),
            Some("fadeOut"),
            Some("250"),
            None,
        );
        let inn = inn.unwrap();
        assert_eq!(inn.kind, TransitionKind::FlyIn);
        assert_eq!(inn.duration_ms, 500);
        assert_eq!(inn.direction, Some(TransitionDirection::NE));

        let out = out.unwrap();
        assert_eq!(out.kind, TransitionKind::FadeOut);
        assert_eq!(out.direction, None);
    }

    #[test]
    fn missing_option_yields_none() {
        let (inn, out) = Transition::pair_from_options(None, None, None, None, None, None);
        assert!(inn.is_none());
        assert!(out.is_none());
    }
}
