use std::time::Duration;

use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType as PngFilterType, PngEncoder};
use image::imageops::{self, FilterType};
use image::{DynamicImage, ExtendedColorType, ImageEncoder, Rgb, RgbImage};
use tracing::{error, info};

use crate::imaging::compositor::{self, BLACK, WHITE};
use crate::imaging::enhance::{self, EnhancementProfile};
use crate::imaging::geometry::{self, FitMode};
use crate::imaging::tiers::{select_wallpaper_tier, QualityTier};
use crate::imaging::PipelineError;

const OPTIMIZED_JPEG_QUALITY: u8 = 85;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    EnhanceQuality(QualityTier),
    Wallpaper,
    /// Shrink to the processing limit and re-encode as JPEG.
    Optimize,
}

impl Operation {
    pub fn name(self) -> &'static str {
        match self {
            Operation::EnhanceQuality(_) => "enhance_quality",
            Operation::Wallpaper => "wallpaper",
            Operation::Optimize => "optimize",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Operation::EnhanceQuality(tier) => tier.label(),
            Operation::Wallpaper => "Wallpaper",
            Operation::Optimize => "Optimized",
        }
    }

    /// Parameter string that distinguishes results of the same operation.
    pub fn params(self) -> String {
        match self {
            Operation::EnhanceQuality(tier) => tier.key().to_string(),
            Operation::Wallpaper | Operation::Optimize => String::new(),
        }
    }

    /// File extension of the encoded result.
    pub fn extension(self) -> &'static str {
        match self {
            Operation::Optimize => "jpg",
            Operation::EnhanceQuality(_) | Operation::Wallpaper => "png",
        }
    }

    fn background(self) -> Rgb<u8> {
        match self {
            Operation::EnhanceQuality(_) | Operation::Optimize => WHITE,
            Operation::Wallpaper => BLACK,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ImagePipeline {
    max_processing_size: u32,
}

impl ImagePipeline {
    pub fn new(max_processing_size: u32) -> Self {
        Self {
            max_processing_size: max_processing_size.max(1),
        }
    }

    /// Decode, normalise and hand off to the operation. CPU bound; call
    /// through [`ImagePipeline::process`] from async code.
    pub fn run(&self, image_bytes: &[u8], operation: Operation) -> Result<Vec<u8>, PipelineError> {
        let decoded = image::load_from_memory(image_bytes).map_err(PipelineError::Decode)?;
        let source = self.limit_size(flatten(decoded, operation.background()));

        match operation {
            Operation::EnhanceQuality(tier) => self.fit_to_canvas(
                source,
                operation,
                tier.dimensions(),
                FitMode::Contain,
                EnhancementProfile::Standard,
            ),
            Operation::Wallpaper => {
                let (width, height) = source.dimensions();
                self.fit_to_canvas(
                    source,
                    operation,
                    select_wallpaper_tier(width, height),
                    FitMode::Cover,
                    EnhancementProfile::Wallpaper,
                )
            }
            Operation::Optimize => {
                info!(
                    "Optimizing {}x{} as JPEG q{}",
                    source.width(),
                    source.height(),
                    OPTIMIZED_JPEG_QUALITY
                );
                encode_jpeg(&source)
            }
        }
    }

    fn fit_to_canvas(
        &self,
        source: RgbImage,
        operation: Operation,
        (target_width, target_height): (u32, u32),
        fit_mode: FitMode,
        profile: EnhancementProfile,
    ) -> Result<Vec<u8>, PipelineError> {
        let (source_width, source_height) = source.dimensions();
        let spec = geometry::plan(
            source_width,
            source_height,
            target_width,
            target_height,
            fit_mode,
        )?;
        info!(
            "Processing {} {}x{} -> {}x{} (scaled {}x{})",
            operation.name(),
            spec.source_width,
            spec.source_height,
            spec.target_width,
            spec.target_height,
            spec.scaled_width,
            spec.scaled_height
        );

        // Cover crops in source pixels first so the resize never exceeds the target.
        let region = compositor::crop_source(source, &spec);
        let visible = spec.crop_rect();
        let resized = if region.dimensions() == (visible.width, visible.height) {
            region
        } else {
            imageops::resize(&region, visible.width, visible.height, FilterType::Lanczos3)
        };
        let enhanced = enhance::apply(resized, profile);
        let canvas = compositor::compose(&enhanced, &spec, operation.background());
        encode_png(&canvas)
    }

    /// Runs the pipeline on the blocking pool so the async runtime keeps
    /// serving other users while pixels are crunched.
    pub async fn process(
        &self,
        image_bytes: Vec<u8>,
        operation: Operation,
        timeout: Option<Duration>,
    ) -> Result<Vec<u8>, PipelineError> {
        let pipeline = *self;
        run_blocking(move || pipeline.run(&image_bytes, operation), timeout).await
    }

    pub async fn enhance_quality(&self, image_bytes: Vec<u8>, quality_key: &str) -> Option<Vec<u8>> {
        let Some(tier) = QualityTier::from_key(quality_key) else {
            error!("Unknown quality option '{quality_key}'");
            return None;
        };
        self.process_or_absent(image_bytes, Operation::EnhanceQuality(tier))
            .await
    }

    pub async fn convert_to_wallpaper(&self, image_bytes: Vec<u8>) -> Option<Vec<u8>> {
        self.process_or_absent(image_bytes, Operation::Wallpaper)
            .await
    }

    pub async fn optimize_image(&self, image_bytes: Vec<u8>) -> Option<Vec<u8>> {
        self.process_or_absent(image_bytes, Operation::Optimize)
            .await
    }

    async fn process_or_absent(&self, image_bytes: Vec<u8>, operation: Operation) -> Option<Vec<u8>> {
        match self.process(image_bytes, operation, None).await {
            Ok(bytes) => Some(bytes),
            Err(err) => {
                error!("Error in {}: {err}", operation.name());
                None
            }
        }
    }

    fn limit_size(&self, image: RgbImage) -> RgbImage {
        let (width, height) = image.dimensions();
        match geometry::fit_within(width, height, self.max_processing_size) {
            Some((limited_width, limited_height)) => {
                info!(
                    "Downscaling oversized source {}x{} to {}x{} before processing",
                    width, height, limited_width, limited_height
                );
                imageops::resize(&image, limited_width, limited_height, FilterType::Lanczos3)
            }
            None => image,
        }
    }
}

/// Moves `job` to the blocking pool. On timeout the job keeps running but its
/// result is dropped; a panicking job surfaces as [`PipelineError::Worker`].
async fn run_blocking<F>(job: F, timeout: Option<Duration>) -> Result<Vec<u8>, PipelineError>
where
    F: FnOnce() -> Result<Vec<u8>, PipelineError> + Send + 'static,
{
    let task = tokio::task::spawn_blocking(job);
    let joined = match timeout {
        Some(limit) => tokio::time::timeout(limit, task)
            .await
            .map_err(|_| PipelineError::Timeout(limit))?,
        None => task.await,
    };
    joined.map_err(|err| PipelineError::Worker(err.to_string()))?
}

/// Normalises any decoded layout to 8-bit RGB, compositing transparent
/// pixels over `background`.
fn flatten(image: DynamicImage, background: Rgb<u8>) -> RgbImage {
    if !image.color().has_alpha() {
        return image.into_rgb8();
    }

    let rgba = image.into_rgba8();
    RgbImage::from_fn(rgba.width(), rgba.height(), |x, y| {
        let [r, g, b, alpha] = rgba.get_pixel(x, y).0;
        let over = |channel: u8, back: u8| -> u8 {
            let alpha = u32::from(alpha);
            ((u32::from(channel) * alpha + u32::from(back) * (255 - alpha) + 127) / 255) as u8
        };
        Rgb([
            over(r, background[0]),
            over(g, background[1]),
            over(b, background[2]),
        ])
    })
}

fn encode_png(image: &RgbImage) -> Result<Vec<u8>, PipelineError> {
    let mut output = Vec::new();
    PngEncoder::new_with_quality(&mut output, CompressionType::Best, PngFilterType::Adaptive)
        .write_image(
            image.as_raw(),
            image.width(),
            image.height(),
            ExtendedColorType::Rgb8,
        )
        .map_err(PipelineError::Encode)?;
    Ok(output)
}

fn encode_jpeg(image: &RgbImage) -> Result<Vec<u8>, PipelineError> {
    let mut output = Vec::new();
    JpegEncoder::new_with_quality(&mut output, OPTIMIZED_JPEG_QUALITY)
        .write_image(
            image.as_raw(),
            image.width(),
            image.height(),
            ExtendedColorType::Rgb8,
        )
        .map_err(PipelineError::Encode)?;
    Ok(output)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use image::{ImageFormat, Rgba, RgbaImage};

    use super::*;

    fn encode(image: DynamicImage, format: ImageFormat) -> Vec<u8> {
        let mut bytes = Cursor::new(Vec::new());
        image.write_to(&mut bytes, format).unwrap();
        bytes.into_inner()
    }

    fn gradient_jpeg(width: u32, height: u32) -> Vec<u8> {
        let image = RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
        });
        encode(DynamicImage::ImageRgb8(image), ImageFormat::Jpeg)
    }

    /// Left half fully transparent, right half opaque blue.
    fn half_transparent_png(width: u32, height: u32) -> Vec<u8> {
        let image = RgbaImage::from_fn(width, height, |x, _| {
            if x < width / 2 {
                Rgba([0, 0, 0, 0])
            } else {
                Rgba([30, 60, 200, 255])
            }
        });
        encode(DynamicImage::ImageRgba8(image), ImageFormat::Png)
    }

    fn decode(bytes: &[u8]) -> RgbImage {
        let format = image::guess_format(bytes).unwrap();
        assert_eq!(format, ImageFormat::Png);
        image::load_from_memory(bytes).unwrap().into_rgb8()
    }

    #[test]
    fn enhance_quality_letterboxes_to_exact_tier() {
        let pipeline = ImagePipeline::new(4096);
        let output = pipeline
            .run(
                &gradient_jpeg(4000, 2000),
                Operation::EnhanceQuality(QualityTier::FullHd),
            )
            .unwrap();
        let image = decode(&output);

        assert_eq!(image.dimensions(), (1920, 1080));
        // 1920x960 content centred vertically, white bars above and below.
        assert_eq!(image.get_pixel(960, 10).0, [255, 255, 255]);
        assert_eq!(image.get_pixel(960, 1070).0, [255, 255, 255]);
    }

    #[test]
    fn small_wallpaper_uses_the_default_tier() {
        let pipeline = ImagePipeline::new(4096);
        let output = pipeline
            .run(&gradient_jpeg(640, 480), Operation::Wallpaper)
            .unwrap();
        assert_eq!(decode(&output).dimensions(), (1920, 1080));
    }

    #[test]
    fn thin_wallpaper_source_fills_the_default_tier() {
        let pipeline = ImagePipeline::new(4096);
        let column = RgbImage::from_fn(1, 4096, |_, y| Rgb([(y % 256) as u8, 80, 160]));
        let source = encode(DynamicImage::ImageRgb8(column), ImageFormat::Png);

        let output = pipeline.run(&source, Operation::Wallpaper).unwrap();
        assert_eq!(decode(&output).dimensions(), (1920, 1080));
    }

    #[tokio::test]
    async fn wide_strip_wallpaper_is_returned_not_dropped() {
        let pipeline = ImagePipeline::new(4096);
        let strip = RgbImage::from_pixel(4096, 4, Rgb([40, 90, 140]));
        let output = pipeline
            .convert_to_wallpaper(encode(DynamicImage::ImageRgb8(strip), ImageFormat::Png))
            .await
            .unwrap();
        assert_eq!(decode(&output).dimensions(), (1920, 1080));
    }

    #[test]
    fn optimize_shrinks_to_the_limit_and_writes_jpeg() {
        let pipeline = ImagePipeline::new(256);
        let output = pipeline
            .run(&half_transparent_png(1024, 512), Operation::Optimize)
            .unwrap();

        assert_eq!(image::guess_format(&output).unwrap(), ImageFormat::Jpeg);
        let image = image::load_from_memory(&output).unwrap().into_rgb8();
        assert_eq!(image.dimensions(), (256, 128));
        let [r, g, b] = image.get_pixel(20, 64).0;
        assert!(r >= 240 && g >= 240 && b >= 240, "got {r},{g},{b}");
    }

    #[tokio::test]
    async fn optimize_keeps_small_images_at_their_size() {
        let pipeline = ImagePipeline::new(4096);
        let output = pipeline
            .optimize_image(gradient_jpeg(300, 200))
            .await
            .unwrap();
        let image = image::load_from_memory(&output).unwrap();
        assert_eq!((image.width(), image.height()), (300, 200));
        assert!(pipeline.optimize_image(b"nope".to_vec()).await.is_none());
    }

    #[test]
    fn operations_name_their_output_format() {
        assert_eq!(Operation::Optimize.extension(), "jpg");
        assert_eq!(Operation::Wallpaper.extension(), "png");
        assert_eq!(Operation::Optimize.params(), "");
    }

    #[test]
    fn transparency_becomes_white_for_quality_enhancement() {
        let pipeline = ImagePipeline::new(4096);
        let output = pipeline
            .run(
                &half_transparent_png(1280, 720),
                Operation::EnhanceQuality(QualityTier::Hd),
            )
            .unwrap();
        let image = decode(&output);

        assert_eq!(image.dimensions(), (1280, 720));
        let [r, g, b] = image.get_pixel(100, 360).0;
        assert!(r >= 250 && g >= 250 && b >= 250, "got {r},{g},{b}");
    }

    #[test]
    fn transparency_becomes_black_for_wallpaper() {
        let pipeline = ImagePipeline::new(4096);
        let output = pipeline
            .run(&half_transparent_png(1280, 720), Operation::Wallpaper)
            .unwrap();
        let image = decode(&output);

        assert_eq!(image.dimensions(), (1920, 1080));
        let [r, g, b] = image.get_pixel(150, 540).0;
        assert!(r <= 5 && g <= 5 && b <= 5, "got {r},{g},{b}");
        let [r, _, b] = image.get_pixel(1800, 540).0;
        assert!(b > r);
    }

    #[test]
    fn equal_aspect_source_gives_same_frame_in_both_modes() {
        let pipeline = ImagePipeline::new(4096);
        let source = gradient_jpeg(960, 540);
        let quality = decode(
            &pipeline
                .run(&source, Operation::EnhanceQuality(QualityTier::FullHd))
                .unwrap(),
        );
        let wallpaper = decode(&pipeline.run(&source, Operation::Wallpaper).unwrap());
        assert_eq!(quality.dimensions(), wallpaper.dimensions());
    }

    #[test]
    fn oversized_sources_are_limited_before_planning() {
        let pipeline = ImagePipeline::new(64);
        let limited = pipeline.limit_size(RgbImage::new(256, 128));
        assert_eq!(limited.dimensions(), (64, 32));
        let untouched = pipeline.limit_size(RgbImage::new(64, 10));
        assert_eq!(untouched.dimensions(), (64, 10));
    }

    #[test]
    fn garbage_bytes_fail_to_decode() {
        let pipeline = ImagePipeline::new(4096);
        let result = pipeline.run(b"definitely not an image", Operation::Wallpaper);
        assert!(matches!(result, Err(PipelineError::Decode(_))));
    }

    #[tokio::test]
    async fn slow_jobs_hit_the_caller_timeout() {
        let result = run_blocking(
            || {
                std::thread::sleep(Duration::from_millis(200));
                Ok(Vec::new())
            },
            Some(Duration::from_millis(5)),
        )
        .await;
        assert!(matches!(result, Err(PipelineError::Timeout(limit)) if limit == Duration::from_millis(5)));
    }

    #[tokio::test]
    async fn large_source_times_out_through_process() {
        let pipeline = ImagePipeline::new(4096);
        let result = pipeline
            .process(
                gradient_jpeg(1600, 1200),
                Operation::EnhanceQuality(QualityTier::FullHd),
                Some(Duration::from_millis(1)),
            )
            .await;
        assert!(matches!(result, Err(PipelineError::Timeout(_))));
    }

    #[tokio::test]
    async fn panicking_job_is_reported_as_worker_failure() {
        let result = run_blocking(|| panic!("decoder blew up"), None).await;
        assert!(matches!(result, Err(PipelineError::Worker(_))));
    }

    #[tokio::test]
    async fn async_entry_points_report_absence_instead_of_errors() {
        let pipeline = ImagePipeline::new(4096);
        assert!(pipeline
            .convert_to_wallpaper(b"broken".to_vec())
            .await
            .is_none());
        assert!(pipeline
            .enhance_quality(gradient_jpeg(64, 64), "16K")
            .await
            .is_none());

        let output = pipeline
            .enhance_quality(gradient_jpeg(400, 300), "HD")
            .await
            .unwrap();
        assert_eq!(decode(&output).dimensions(), (1280, 720));
    }
}
