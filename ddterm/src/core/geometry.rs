use ddterm_ipc::{WindowPosition, DEFAULT_WINDOW_HEIGHT};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn right(&self) -> i32 {
        self.x + self.width as i32
    }

    pub fn bottom(&self) -> i32 {
        self.y + self.height as i32
    }

    /// Size along the given axis.
    pub fn extent(&self, axis: Axis) -> u32 {
        match axis {
            Axis::Vertical => self.height,
            Axis::Horizontal => self.width,
        }
    }
}

impl std::fmt::Display for Rect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "({}, {}) {}x{}",
            self.x, self.y, self.width, self.height
        )
    }
}

/// Axis the size ratio applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    Vertical,
    Horizontal,
}

impl Axis {
    pub fn of(position: WindowPosition) -> Self {
        if position.is_vertical() {
            Axis::Vertical
        } else {
            Axis::Horizontal
        }
    }

    pub fn other(self) -> Self {
        match self {
            Axis::Vertical => Axis::Horizontal,
            Axis::Horizontal => Axis::Vertical,
        }
    }
}

/// Window size as a fraction of the work area, always in (0, 1].
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct SizeRatio(f64);

impl SizeRatio {
    pub const FULL: SizeRatio = SizeRatio(1.0);

    pub fn new(value: f64) -> Option<Self> {
        if value.is_finite() && value > 0.0 && value <= 1.0 {
            Some(Self(value))
        } else {
            None
        }
    }

    /// Like `new`, but values above 1 are clamped instead of rejected.
    pub fn clamped(value: f64) -> Option<Self> {
        if value.is_finite() && value > 1.0 {
            return Some(Self::FULL);
        }
        Self::new(value)
    }

    pub fn get(self) -> f64 {
        self.0
    }

    pub fn is_full(self) -> bool {
        self.0 >= 1.0
    }
}

impl Default for SizeRatio {
    fn default() -> Self {
        Self(DEFAULT_WINDOW_HEIGHT)
    }
}

impl std::fmt::Display for SizeRatio {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.4}", self.0)
    }
}

/// Rectangle the window should occupy: the full work area on the
/// perpendicular axis, `ratio` of it on the position axis, anchored to the
/// configured edge.
///
/// The size along the position axis is rounded to whole pixels and then
/// truncated to a multiple of the monitor scale, which is the smallest step
/// the compositor can apply on scaled monitors.
pub fn target_rect(
    work_area: Rect,
    monitor_scale: u32,
    ratio: SizeRatio,
    position: WindowPosition,
) -> Rect {
    let scale = monitor_scale.max(1);
    let mut rect = work_area;

    match position {
        WindowPosition::Top => {
            rect.height = scaled_extent(work_area.height, ratio, scale);
        }
        WindowPosition::Bottom => {
            rect.height = scaled_extent(work_area.height, ratio, scale);
            rect.y = work_area.bottom() - rect.height as i32;
        }
        WindowPosition::Left => {
            rect.width = scaled_extent(work_area.width, ratio, scale);
        }
        WindowPosition::Right => {
            rect.width = scaled_extent(work_area.width, ratio, scale);
            rect.x = work_area.right() - rect.width as i32;
        }
    }

    rect
}

fn scaled_extent(extent: u32, ratio: SizeRatio, scale: u32) -> u32 {
    let raw = (f64::from(extent) * ratio.get()).round() as u32;
    let aligned = raw - raw % scale;
    aligned.max(scale.min(extent))
}

/// Ratio described by a window frame inside a work area.
///
/// Returns `None` when the work area or frame is degenerate on the axis.
pub fn ratio_from_frame(frame: Rect, work_area: Rect, position: WindowPosition) -> Option<SizeRatio> {
    let axis = Axis::of(position);
    let available = work_area.extent(axis);
    if available == 0 {
        return None;
    }
    SizeRatio::clamped(f64::from(frame.extent(axis)) / f64::from(available))
}
