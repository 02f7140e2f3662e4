use serde::{Deserialize, Serialize};
use std::fmt;

/// Direction of a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Long,
    Short,
}

impl Side {
    /// +1.0 for long, -1.0 for short.
    pub fn sign(self) -> f64 {
        match self {
            Side::Long => 1.0,
            Side::Short => -1.0,
        }
    }

    /// Signed relative move from `entry` to `exit`, positive when the position gains.
    pub fn relative_move(self, entry: f64, exit: f64) -> f64 {
        self.sign() * (exit - entry) / entry
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Long => write!(f, "long"),
            Side::Short => write!(f, "short"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_move_is_signed_by_side() {
        assert!((Side::Long.relative_move(100.0, 103.0) - 0.03).abs() < 1e-12);
        assert!((Side::Short.relative_move(100.0, 103.0) + 0.03).abs() < 1e-12);
    }
}
