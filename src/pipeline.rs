//! Crop, generate and composite.

use std::{borrow::Cow, sync::Arc};

use futures::{future::BoxFuture, FutureExt};
use image::{imageops, RgbaImage};
use log::{debug, info};

use crate::{
    generation::{
        generate_with_retry, ArtStyle, Delay, EncodedImage, GenerationProvider, GenerationRequest, RetryPolicy,
        ThreadDelay,
    },
    geometry::PixelBox,
    image_utils::{decode, encode_for_mime},
    raster::{self, blend_over, premultiply, CoverageMask},
    selection::Selection,
    session::{EditingSession, GenerationOptions, GenerationTicket, TargetId},
    EditorError,
};

/// Pixel box the generation input was cropped from.
pub type CropInfo = PixelBox;

/// What is needed to paste a result back into the primary image.
#[derive(Debug, Clone)]
pub struct CropContext {
    pub info: CropInfo,
    pub selection: Selection,
    pub original: Arc<RgbaImage>,
}

/// Snapshot of everything one generation needs. The session may keep
/// changing after this is taken.
#[derive(Debug, Clone)]
pub struct PreparedGeneration {
    pub ticket: GenerationTicket,
    pub request: GenerationRequest,
    pub crop: Option<CropContext>,
}

#[derive(Debug, Clone)]
pub struct GenerationOutcome {
    pub ticket: GenerationTicket,
    pub style: ArtStyle,
    pub result: Result<RgbaImage, EditorError>,
}

/// Builds the request. With the primary target active and a selection
/// present only the selection's bounding box is sent; otherwise the
/// primary's stored bytes go out unchanged.
pub(crate) fn prepare(
    session: &EditingSession,
    ticket: GenerationTicket,
    options: &GenerationOptions,
) -> Result<PreparedGeneration, EditorError> {
    let primary = session.primary().ok_or(EditorError::NoImage)?;

    let crop = match (session.active_target(), session.selection(), session.working()) {
        (TargetId::Primary, Some(selection), Some(working)) => {
            raster::selection_region(selection, working.width(), working.height()).map(|info| {
                (
                    raster::crop(working, info),
                    CropContext {
                        info,
                        selection: selection.clone(),
                        original: Arc::new(working.clone()),
                    },
                )
            })
        }
        _ => None,
    };

    let (image, crop) = match crop {
        Some((cropped, context)) => {
            let (bytes, mime) = encode_for_mime(&cropped, &primary.mime)?;
            info!("Send {:?} crop of the primary image", context.info);
            (EncodedImage::new(bytes, mime), Some(context))
        }
        None => {
            info!("Send the whole primary image");
            (primary.encoded(), None)
        }
    };

    let references = session
        .references()
        .iter()
        .map(|r| r.for_generation())
        .collect();

    Ok(PreparedGeneration {
        ticket,
        request: GenerationRequest {
            image: Some(image),
            style: options.style,
            quality: options.quality,
            instructions: options.instructions.clone(),
            references,
        },
        crop,
    })
}

/// Dispatches prepared generations and pastes results back.
pub struct CompositePipeline {
    provider: Arc<dyn GenerationProvider>,
    policy: RetryPolicy,
    delay: Arc<dyn Delay>,
}

impl CompositePipeline {
    pub fn new(provider: Arc<dyn GenerationProvider>) -> Self {
        Self {
            provider,
            policy: RetryPolicy::default(),
            delay: Arc::new(ThreadDelay),
        }
    }

    pub fn with_retry(self, policy: RetryPolicy, delay: Arc<dyn Delay>) -> Self {
        Self {
            policy,
            delay,
            ..self
        }
    }

    pub fn provider(&self) -> &dyn GenerationProvider {
        self.provider.as_ref()
    }

    pub fn run(&self, prepared: PreparedGeneration) -> BoxFuture<'static, GenerationOutcome> {
        let PreparedGeneration { ticket, request, crop } = prepared;
        let style = request.style;
        let crop = crop.filter(|_| self.provider.capabilities().can_composite());
        let generation = generate_with_retry(self.provider.clone(), request, self.policy, self.delay.clone());

        async move {
            let result = match generation.await {
                Ok(bytes) => finish_off_thread(bytes, crop).await,
                Err(e) => Err(e.into()),
            };
            GenerationOutcome { ticket, style, result }
        }
        .boxed()
    }
}

async fn finish_off_thread(bytes: Vec<u8>, crop: Option<CropContext>) -> Result<RgbaImage, EditorError> {
    let (tx, rx) = futures::channel::oneshot::channel();
    std::thread::spawn(move || {
        let result = decode(&bytes).map(|generated| match crop {
            Some(crop) => composite(&crop.original, &generated, &crop.selection, crop.info),
            None => generated,
        });
        let _ = tx.send(result);
    });
    rx.await
        .unwrap_or_else(|_| Err(EditorError::Decode("result worker stopped".into())))
}

/// Original image with `result`, scaled to `info`, painted inside the selection path only.
pub fn composite(original: &RgbaImage, result: &RgbaImage, selection: &Selection, info: CropInfo) -> RgbaImage {
    let mut out = original.clone();
    let scaled = if result.dimensions() == (info.w, info.h) {
        Cow::Borrowed(result)
    } else {
        debug!(
            "Scale result {:?} into {}x{}",
            result.dimensions(),
            info.w,
            info.h
        );
        Cow::Owned(imageops::resize(
            result,
            info.w,
            info.h,
            imageops::FilterType::CatmullRom,
        ))
    };
    let mask = CoverageMask::for_selection(selection, info);
    for (x, y, coverage) in mask.covered() {
        if x < out.width() && y < out.height() {
            let src = premultiply(*scaled.get_pixel(x - info.x, y - info.y));
            blend_over(out.get_pixel_mut(x, y), src, coverage);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use emath::pos2;
    use image::Rgba;

    use super::*;
    use crate::geometry::ImageRect;

    #[test]
    fn composite_only_touches_selection_path() {
        let original = RgbaImage::from_pixel(20, 20, Rgba([0, 0, 255, 255]));
        let result = RgbaImage::from_pixel(10, 10, Rgba([255, 0, 0, 255]));
        let selection = Selection::Freehand {
            points: vec![pos2(5.0, 5.0), pos2(15.0, 5.0), pos2(5.0, 15.0)],
        };
        let out = composite(&original, &result, &selection, PixelBox::new(5, 5, 10, 10));

        assert_eq!(&Rgba([255, 0, 0, 255]), out.get_pixel(6, 6));
        assert_eq!(&Rgba([0, 0, 255, 255]), out.get_pixel(14, 14));
        assert_eq!(&Rgba([0, 0, 255, 255]), out.get_pixel(2, 2));
    }

    #[test]
    fn result_of_other_size_is_scaled_into_box() {
        let original = RgbaImage::from_pixel(40, 40, Rgba([0, 0, 0, 255]));
        let result = RgbaImage::from_pixel(5, 5, Rgba([0, 200, 0, 255]));
        let selection = Selection::Rectangle {
            rect: ImageRect::new(10.0, 10.0, 20.0, 20.0),
        };
        let out = composite(&original, &result, &selection, PixelBox::new(10, 10, 20, 20));
        assert_eq!(&Rgba([0, 200, 0, 255]), out.get_pixel(10, 10));
        assert_eq!(&Rgba([0, 200, 0, 255]), out.get_pixel(29, 29));
        assert_eq!(&Rgba([0, 0, 0, 255]), out.get_pixel(30, 30));
        assert_eq!(&Rgba([0, 0, 0, 255]), out.get_pixel(9, 20));
    }
}
