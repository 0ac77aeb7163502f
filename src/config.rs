use clap::ValueEnum;

/// Default bound on nested user-function calls.
pub const DEFAULT_MAX_DEPTH: usize = 128;

/// Ceiling for [`Config::with_max_depth`]. Each call level uses native stack,
/// so deeper limits could overflow it before `TooDeep` is reported.
pub const MAX_DEPTH_LIMIT: usize = 256;

/// Character used as the decimal mark in number literals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum RadixChar {
    #[default]
    Dot,
    Comma,
}

impl RadixChar {
    pub fn as_char(self) -> char {
        match self {
            RadixChar::Dot => '.',
            RadixChar::Comma => ',',
        }
    }
}

/// Unit used by the trigonometric built-ins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum AngleMode {
    #[default]
    Radian,
    Degree,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub radix: RadixChar,
    pub angle: AngleMode,
    pub max_depth: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            radix: RadixChar::default(),
            angle: AngleMode::default(),
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl Config {
    pub fn with_radix(mut self, radix: RadixChar) -> Self {
        self.radix = radix;
        self
    }

    pub fn with_angle(mut self, angle: AngleMode) -> Self {
        self.angle = angle;
        self
    }

    /// Sets the call depth limit, clamped to [`MAX_DEPTH_LIMIT`].
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth.min(MAX_DEPTH_LIMIT);
        self
    }

    pub fn is_radix_char(&self, c: char) -> bool {
        c == self.radix.as_char()
    }

    /// Function-argument separator. A comma only separates arguments while
    /// it is not the decimal mark; `;` inside a call always does.
    pub fn is_separator_char(&self, c: char) -> bool {
        c == ',' && !self.is_radix_char(c)
    }
}
