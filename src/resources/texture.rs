//! Base color texture decoding.
//!
//! Image bytes are collected up front (from buffer views or the resource
//! table), decoded on tokio's blocking pool and joined before any GPU upload.
//! A load therefore never presents a partially textured asset.

use std::{borrow::Cow, collections::BTreeSet};

use image::{ImageFormat, load_from_memory_with_format};

use crate::{
    backend::DecodedImage,
    error::{Result, SessionError},
    resources::{ResourceResolver, view_bytes},
};

/// Encoded image bytes waiting for a decode worker.
#[derive(Clone, Debug)]
pub struct TextureRequest {
    /// Index of the image in the glTF document.
    pub image: usize,
    pub label: String,
    pub bytes: Vec<u8>,
    pub mime_type: Option<String>,
}

/// Gather the images referenced from material base color slots, each once,
/// in image index order.
pub fn collect_requests(
    document: &gltf::Document,
    buffers: &[Cow<'_, [u8]>],
    resolver: &ResourceResolver<'_>,
    model_name: &str,
) -> Result<Vec<TextureRequest>> {
    let images: BTreeSet<usize> = document
        .materials()
        .filter_map(|material| {
            material
                .pbr_metallic_roughness()
                .base_color_texture()
                .map(|info| info.texture().source().index())
        })
        .collect();

    let mut requests = Vec::with_capacity(images.len());
    for image in document.images().filter(|image| images.contains(&image.index())) {
        let label = image
            .name()
            .map(str::to_string)
            .unwrap_or_else(|| format!("{}#image{}", model_name, image.index()));
        let (bytes, mime_type) = match image.source() {
            gltf::image::Source::View { view, mime_type } => (
                view_bytes(&view, buffers)?.to_vec(),
                Some(mime_type.to_string()),
            ),
            gltf::image::Source::Uri { uri, mime_type } => (
                resolver.resolve(uri)?.into_owned(),
                mime_type.map(str::to_string),
            ),
        };
        requests.push(TextureRequest {
            image: image.index(),
            label,
            bytes,
            mime_type,
        });
    }
    Ok(requests)
}

/// Decode a single image into RGBA8. Base color maps are sRGB.
pub fn decode(request: TextureRequest) -> Result<(usize, DecodedImage)> {
    let format = request
        .mime_type
        .as_deref()
        .and_then(|mime| mime.split('/').next_back())
        .and_then(ImageFormat::from_extension);
    let img = match format {
        Some(format) => load_from_memory_with_format(&request.bytes, format),
        None => image::load_from_memory(&request.bytes),
    }
    .map_err(|e| SessionError::parse(format!("texture {}", request.label), e))?;
    let rgba = img.to_rgba8();
    Ok((
        request.image,
        DecodedImage {
            label: request.label,
            width: rgba.width(),
            height: rgba.height(),
            rgba: rgba.into_raw(),
            srgb: true,
        },
    ))
}

/// Start decoding every request on the blocking pool.
///
/// The workers are spawned immediately; the returned future joins them and
/// fails with the first decode error, dropping the remaining results. Must be
/// called inside a tokio runtime.
pub fn decode_all(
    requests: Vec<TextureRequest>,
) -> impl Future<Output = Result<Vec<(usize, DecodedImage)>>> {
    let jobs: Vec<_> = requests
        .into_iter()
        .map(|request| {
            let label = request.label.clone();
            let handle = tokio::task::spawn_blocking(move || decode(request));
            async move {
                handle
                    .await
                    .map_err(|e| SessionError::parse(format!("texture {label}"), e))?
            }
        })
        .collect();
    futures::future::try_join_all(jobs)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn png(width: u32, height: u32) -> Vec<u8> {
        let img = image::RgbaImage::from_pixel(width, height, image::Rgba([255, 0, 0, 255]));
        let mut bytes = std::io::Cursor::new(Vec::new());
        img.write_to(&mut bytes, ImageFormat::Png).unwrap();
        bytes.into_inner()
    }

    #[test]
    fn decodes_with_and_without_mime_hint() {
        for mime_type in [Some("image/png".to_string()), None] {
            let (index, image) = decode(TextureRequest {
                image: 3,
                label: "albedo".into(),
                bytes: png(2, 3),
                mime_type,
            })
            .unwrap();
            assert_eq!(index, 3);
            assert_eq!((image.width, image.height), (2, 3));
            assert_eq!(image.rgba.len(), 2 * 3 * 4);
            assert_eq!(&image.rgba[..4], &[255, 0, 0, 255]);
        }
    }

    #[test]
    fn garbage_is_a_parse_error() {
        let err = decode(TextureRequest {
            image: 0,
            label: "broken".into(),
            bytes: vec![1, 2, 3, 4],
            mime_type: Some("image/png".into()),
        })
        .unwrap_err();
        assert!(matches!(err, SessionError::Parse { .. }));
    }

    #[tokio::test]
    async fn decode_all_keeps_request_order() {
        let requests = (0..4)
            .map(|i| TextureRequest {
                image: i,
                label: format!("img{i}"),
                bytes: png(i as u32 + 1, 1),
                mime_type: None,
            })
            .collect();
        let decoded = decode_all(requests).await.unwrap();
        let widths: Vec<u32> = decoded.iter().map(|(_, image)| image.width).collect();
        assert_eq!(widths, vec![1, 2, 3, 4]);
    }
}
