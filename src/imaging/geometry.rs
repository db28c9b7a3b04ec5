use crate::imaging::PipelineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FitMode {
    /// Scale so the whole source fits inside the target, padding the rest.
    Contain,
    /// Scale so the source fills the target, cropping the overflow.
    Cover,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GeometrySpec {
    pub source_width: u32,
    pub source_height: u32,
    pub target_width: u32,
    pub target_height: u32,
    pub fit_mode: FitMode,
    pub scaled_width: u32,
    pub scaled_height: u32,
    /// Centering offset of the scaled image inside the target box.
    /// Negative on an axis where the scaled image overflows (cover only).
    pub offset_x: i64,
    pub offset_y: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl GeometrySpec {
    pub fn needs_crop(&self) -> bool {
        self.scaled_width > self.target_width || self.scaled_height > self.target_height
    }

    /// Region of the scaled image that survives compositing. Overflowing axes
    /// are centred on the unclamped offset; other axes keep the full extent.
    pub fn crop_rect(&self) -> CropRect {
        let (x, width) = crop_axis(self.offset_x, self.scaled_width, self.target_width);
        let (y, height) = crop_axis(self.offset_y, self.scaled_height, self.target_height);
        CropRect {
            x,
            y,
            width,
            height,
        }
    }

    /// [`GeometrySpec::crop_rect`] mapped back onto the unscaled source.
    /// Cropping here first keeps the resize bounded by the target size.
    pub fn source_crop_rect(&self) -> CropRect {
        let rect = self.crop_rect();
        let (x, width) = source_axis(rect.x, rect.width, self.scaled_width, self.source_width);
        let (y, height) = source_axis(rect.y, rect.height, self.scaled_height, self.source_height);
        CropRect {
            x,
            y,
            width,
            height,
        }
    }

    pub fn paste_position(&self) -> (i64, i64) {
        (self.offset_x.max(0), self.offset_y.max(0))
    }
}

fn source_axis(start: u32, extent: u32, scaled: u32, source: u32) -> (u32, u32) {
    if extent >= scaled {
        return (0, source);
    }
    let ratio = f64::from(source) / f64::from(scaled);
    let begin = (f64::from(start) * ratio).round() as u32;
    let end = (f64::from(start + extent) * ratio).round() as u32;
    let length = end.saturating_sub(begin).clamp(1, source);
    (begin.min(source - length), length)
}

fn crop_axis(offset: i64, scaled: u32, target: u32) -> (u32, u32) {
    if scaled <= target {
        return (0, scaled);
    }
    let start = (-offset).clamp(0, i64::from(scaled - target)) as u32;
    (start, target)
}

fn centered_offset(target: u32, scaled: u32) -> i64 {
    (i64::from(target) - i64::from(scaled)).div_euclid(2)
}

fn scale_dimension(value: u32, scale: f64) -> u32 {
    ((f64::from(value) * scale).round() as u32).max(1)
}

pub fn plan(
    source_width: u32,
    source_height: u32,
    target_width: u32,
    target_height: u32,
    fit_mode: FitMode,
) -> Result<GeometrySpec, PipelineError> {
    if source_width == 0 || source_height == 0 || target_width == 0 || target_height == 0 {
        return Err(PipelineError::Geometry(format!(
            "non-positive dimensions: source {source_width}x{source_height}, target {target_width}x{target_height}"
        )));
    }

    let same_aspect = u64::from(source_width) * u64::from(target_height)
        == u64::from(source_height) * u64::from(target_width);

    let (scaled_width, scaled_height) = if same_aspect {
        (target_width, target_height)
    } else {
        let scale_x = f64::from(target_width) / f64::from(source_width);
        let scale_y = f64::from(target_height) / f64::from(source_height);
        let scale = match fit_mode {
            FitMode::Contain => scale_x.min(scale_y),
            FitMode::Cover => scale_x.max(scale_y),
        };
        let width = scale_dimension(source_width, scale);
        let height = scale_dimension(source_height, scale);
        match fit_mode {
            FitMode::Contain => (width.min(target_width), height.min(target_height)),
            FitMode::Cover => (width.max(target_width), height.max(target_height)),
        }
    };

    Ok(GeometrySpec {
        source_width,
        source_height,
        target_width,
        target_height,
        fit_mode,
        scaled_width,
        scaled_height,
        offset_x: centered_offset(target_width, scaled_width),
        offset_y: centered_offset(target_height, scaled_height),
    })
}

/// Largest dimensions not exceeding `max_edge` on either axis that keep the
/// source aspect ratio. Returns `None` when the source already fits.
pub fn fit_within(width: u32, height: u32, max_edge: u32) -> Option<(u32, u32)> {
    if width <= max_edge && height <= max_edge {
        return None;
    }
    let scale = (f64::from(max_edge) / f64::from(width)).min(f64::from(max_edge) / f64::from(height));
    Some((
        scale_dimension(width, scale).min(max_edge),
        scale_dimension(height, scale).min(max_edge),
    ))
}
