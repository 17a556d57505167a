const DEFAULT_MIN_DIMENSION: u32 = 320;
const DEFAULT_MAX_DIMENSION: u32 = 4096;
const DEFAULT_MAX_ASPECT_RATIO: f64 = 4.0;

#[derive(Debug, Clone)]
pub struct ValidatorConfig {
    /// Smallest accepted width or height in pixels
    min_dimension: u32,

    /// Largest accepted width or height in pixels
    max_dimension: u32,

    /// Long side over short side must stay strictly below this
    max_aspect_ratio: f64,
}

impl ValidatorConfig {
    pub fn default() -> Self {
        Self {
            min_dimension: DEFAULT_MIN_DIMENSION,
            max_dimension: DEFAULT_MAX_DIMENSION,
            max_aspect_ratio: DEFAULT_MAX_ASPECT_RATIO,
        }
    }

    pub fn min_dimension(&self) -> u32 {
        self.min_dimension
    }

    pub fn max_dimension(&self) -> u32 {
        self.max_dimension
    }

    pub fn with_dimension_bounds(mut self, min: u32, max: u32) -> Self {
        assert!(min > 0 && min <= max);
        self.min_dimension = min;
        self.max_dimension = max;

        self
    }

    pub fn max_aspect_ratio(&self) -> f64 {
        self.max_aspect_ratio
    }

    pub fn with_max_aspect_ratio(mut self, value: f64) -> Self {
        assert!(value >= 1.0);
        self.max_aspect_ratio = value;

        self
    }

    /// Whether a picture of this size may be handed to the decoder
    pub fn accepts(&self, width: u32, height: u32) -> bool {
        let in_bounds = |v: u32| v >= self.min_dimension && v <= self.max_dimension;

        if !in_bounds(width) || !in_bounds(height) {
            return false;
        }

        let (long, short) = if width > height {
            (width, height)
        } else {
            (height, width)
        };

        (long as f64) / (short as f64) < self.max_aspect_ratio
    }
}
