use std::fmt;
use std::str::FromStr;

/// Recording grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Quantize {
    Off,
    #[default]
    Sixteenth,
    Eighth,
    Quarter,
    Half,
    Whole,
}

impl Quantize {
    /// Grid size in beats, `None` when quantization is off.
    pub fn grid_beats(&self) -> Option<f64> {
        match self {
            Quantize::Off => None,
            Quantize::Sixteenth => Some(0.25),
            Quantize::Eighth => Some(0.5),
            Quantize::Quarter => Some(1.0),
            Quantize::Half => Some(2.0),
            Quantize::Whole => Some(4.0),
        }
    }

    /// Snaps `beats` to the nearest grid point.
    pub fn apply(&self, beats: f64) -> f64 {
        match self.grid_beats() {
            Some(grid) => (beats / grid).round() * grid,
            None => beats,
        }
    }
}

impl fmt::Display for Quantize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Quantize::Off => "off",
            Quantize::Sixteenth => "16th",
            Quantize::Eighth => "8th",
            Quantize::Quarter => "quarter",
            Quantize::Half => "half",
            Quantize::Whole => "whole",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for Quantize {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "off" | "none" => Ok(Quantize::Off),
            "16th" | "sixteenth" => Ok(Quantize::Sixteenth),
            "8th" | "eighth" => Ok(Quantize::Eighth),
            "quarter" | "4th" => Ok(Quantize::Quarter),
            "half" => Ok(Quantize::Half),
            "whole" | "bar" => Ok(Quantize::Whole),
            other => Err(format!("unknown quantization '{}'", other)),
        }
    }
}
