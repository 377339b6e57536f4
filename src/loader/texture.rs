use std::path::Path;

use ash::vk;
use image::DynamicImage;

use super::LoadedMaterial;
use crate::error::{Result, TracerError};
use crate::observer::{notify_texture_loaded, LoadObserver};

#[allow(non_camel_case_types)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    /// 8 bit per channel, normalized
    R8G8B8A8_UNORM,
    /// 32 bit float per channel, for HDR data
    R32G32B32A32_SFLOAT,
}

impl ImageFormat {
    pub fn vk_format(self) -> vk::Format {
        match self {
            ImageFormat::R8G8B8A8_UNORM => vk::Format::R8G8B8A8_UNORM,
            ImageFormat::R32G32B32A32_SFLOAT => vk::Format::R32G32B32A32_SFLOAT,
        }
    }
}

/// Decoded pixels of one texture, array layers stored one after another.
#[derive(Debug, Clone)]
pub struct TextureData {
    pub width: u32,
    pub height: u32,
    pub layers: u32,
    pub format: ImageFormat,
    pub bytes: Vec<u8>,
}

impl TextureData {
    pub fn extent(&self) -> vk::Extent3D {
        vk::Extent3D {
            width: self.width,
            height: self.height,
            depth: 1,
        }
    }
}

/// Array layers of the surface texture.
pub const ALBEDO_LAYER: u32 = 0;
pub const ROUGHNESS_METALLIC_ALPHA_LAYER: u32 = 1;
pub const NORMAL_LAYER: u32 = 2;
pub const SURFACE_LAYER_COUNT: u32 = 3;

const DEFAULT_ALBEDO: [u8; 4] = [255, 255, 255, 255];
const DEFAULT_NORMAL: [u8; 4] = [128, 128, 255, 255];
const DEFAULT_ROUGHNESS: u8 = 255;
const DEFAULT_METALLIC: u8 = 0;
const DEFAULT_ALPHA: u8 = 255;

fn open_image(path: &Path) -> Result<DynamicImage> {
    image::open(path).map_err(|error| TracerError::asset(path, error))
}

/// The emission map as RGBA32F, or a single texel holding the material's emission.
pub fn load_emission_texture(
    material: &LoadedMaterial,
    observer: &dyn LoadObserver,
) -> Result<TextureData> {
    match &material.maps.emission {
        Some(path) => load_hdr_texture(path, observer),
        None => {
            let emission = material.emission;
            let texel = [emission.x, emission.y, emission.z, 1.0];
            Ok(TextureData {
                width: 1,
                height: 1,
                layers: 1,
                format: ImageFormat::R32G32B32A32_SFLOAT,
                bytes: bytemuck::cast_slice(&texel).to_vec(),
            })
        }
    }
}

/// Decodes any supported image, usually an equirectangular `.hdr`, into RGBA32F.
pub fn load_hdr_texture(path: &Path, observer: &dyn LoadObserver) -> Result<TextureData> {
    let image = open_image(path)?.into_rgba32f();
    notify_texture_loaded(observer, path);

    Ok(TextureData {
        width: image.width(),
        height: image.height(),
        layers: 1,
        format: ImageFormat::R32G32B32A32_SFLOAT,
        bytes: bytemuck::cast_slice(image.as_raw()).to_vec(),
    })
}

/// Albedo, roughness/metallic/alpha and normal maps merged into one three layer RGBA8 texture.
/// Every map of a material must have the same extent; absent maps become constants.
pub fn load_surface_texture(
    material: &LoadedMaterial,
    observer: &dyn LoadObserver,
) -> Result<TextureData> {
    let maps = &material.maps;
    let albedo = decode_map(maps.albedo.as_deref(), false, observer)?;
    let normal = decode_map(maps.normal.as_deref(), false, observer)?;
    let roughness = decode_map(maps.roughness.as_deref(), true, observer)?;
    let metallic = decode_map(maps.metallic.as_deref(), true, observer)?;
    let alpha = decode_map(maps.alpha.as_deref(), true, observer)?;

    let decoded = [&albedo, &normal, &roughness, &metallic, &alpha];
    let extents: Vec<(&Path, (u32, u32))> = decoded
        .iter()
        .filter_map(|map| map.as_ref())
        .map(|map| (map.path, map.extent))
        .collect();
    let (width, height) = common_extent(&extents)?;
    let bytes = pack_surface_layers(
        (width * height) as usize,
        bytes_of(&albedo),
        bytes_of(&roughness),
        bytes_of(&metallic),
        bytes_of(&alpha),
        bytes_of(&normal),
    );

    Ok(TextureData {
        width,
        height,
        layers: SURFACE_LAYER_COUNT,
        format: ImageFormat::R8G8B8A8_UNORM,
        bytes,
    })
}

struct DecodedMap<'a> {
    path: &'a Path,
    extent: (u32, u32),
    bytes: Vec<u8>,
}

fn decode_map<'a>(
    path: Option<&'a Path>,
    single_channel: bool,
    observer: &dyn LoadObserver,
) -> Result<Option<DecodedMap<'a>>> {
    let Some(path) = path else { return Ok(None) };
    let image = open_image(path)?;
    let (extent, bytes) = if single_channel {
        let image = image.into_luma8();
        (image.dimensions(), image.into_raw())
    } else {
        let image = image.into_rgba8();
        (image.dimensions(), image.into_raw())
    };
    notify_texture_loaded(observer, path);

    Ok(Some(DecodedMap {
        path,
        extent,
        bytes,
    }))
}

fn bytes_of<'a>(map: &'a Option<DecodedMap>) -> Option<&'a [u8]> {
    map.as_ref().map(|map| map.bytes.as_slice())
}

/// The shared extent of all decoded maps, 1x1 if there are none.
pub fn common_extent(extents: &[(&Path, (u32, u32))]) -> Result<(u32, u32)> {
    let Some((_, first)) = extents.first() else {
        return Ok((1, 1));
    };

    for (path, extent) in extents {
        if extent != first {
            return Err(TracerError::asset(
                *path,
                format!(
                    "extent {}x{} differs from the {}x{} of the other maps of its material",
                    extent.0, extent.1, first.0, first.1
                ),
            ));
        }
    }
    Ok(*first)
}

/// Lays out the three surface layers for `texel_count` texels each.
/// Roughness, metallic and alpha end up in the red, green and blue channels of the middle layer.
pub fn pack_surface_layers(
    texel_count: usize,
    albedo: Option<&[u8]>,
    roughness: Option<&[u8]>,
    metallic: Option<&[u8]>,
    alpha: Option<&[u8]>,
    normal: Option<&[u8]>,
) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(texel_count * 4 * SURFACE_LAYER_COUNT as usize);

    match albedo {
        Some(albedo) => bytes.extend_from_slice(albedo),
        None => bytes.extend(DEFAULT_ALBEDO.iter().cycle().take(texel_count * 4)),
    }

    let channel = |map: Option<&[u8]>, index: usize, default: u8| {
        map.map_or(default, |map| map[index])
    };
    for index in 0..texel_count {
        bytes.extend_from_slice(&[
            channel(roughness, index, DEFAULT_ROUGHNESS),
            channel(metallic, index, DEFAULT_METALLIC),
            channel(alpha, index, DEFAULT_ALPHA),
            255,
        ]);
    }

    match normal {
        Some(normal) => bytes.extend_from_slice(normal),
        None => bytes.extend(DEFAULT_NORMAL.iter().cycle().take(texel_count * 4)),
    }

    bytes
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use image::{GrayImage, Luma};
    use ultraviolet::Vec3;

    use super::*;
    use crate::observer::tests::RecordingObserver;

    #[test]
    fn single_channels_are_packed_into_the_middle_layer() {
        let roughness = [10, 11];
        let metallic = [20, 21];
        let alpha = [30, 31];
        let bytes = pack_surface_layers(
            2,
            None,
            Some(&roughness),
            Some(&metallic),
            Some(&alpha),
            None,
        );

        assert_eq!(bytes.len(), 2 * 4 * 3);
        assert_eq!(&bytes[0..8], &[255; 8]);
        assert_eq!(&bytes[8..16], &[10, 20, 30, 255, 11, 21, 31, 255]);
        assert_eq!(&bytes[16..20], &DEFAULT_NORMAL);
    }

    #[test]
    fn missing_channels_use_defaults() {
        let bytes = pack_surface_layers(1, None, None, Some(&[7]), None, None);
        let layer = &bytes[4..8];
        assert_eq!(layer, &[DEFAULT_ROUGHNESS, 7, DEFAULT_ALPHA, 255]);
    }

    #[test]
    fn mismatched_extents_are_rejected() {
        let albedo = Path::new("albedo.png");
        let roughness = Path::new("roughness.png");
        assert_eq!(common_extent(&[]).unwrap(), (1, 1));
        assert_eq!(
            common_extent(&[(albedo, (4, 4)), (roughness, (4, 4))]).unwrap(),
            (4, 4)
        );
        match common_extent(&[(albedo, (4, 4)), (roughness, (2, 4))]) {
            Err(TracerError::Asset { path, .. }) => assert_eq!(path, roughness),
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[test]
    fn emission_without_map_is_a_single_texel() {
        let mut material = LoadedMaterial::missing_material();
        material.emission = Vec3::new(2.0, 3.0, 4.0);
        let observer = RecordingObserver::default();

        let texture = load_emission_texture(&material, &observer).unwrap();

        assert_eq!((texture.width, texture.height, texture.layers), (1, 1, 1));
        let texel: &[f32] = bytemuck::cast_slice(&texture.bytes);
        assert_eq!(texel, &[2.0, 3.0, 4.0, 1.0]);
        assert!(observer.textures.borrow().is_empty());
    }

    #[test]
    fn surface_maps_are_decoded_and_reported() {
        let dir = tempfile::tempdir().unwrap();
        let roughness_path = dir.path().join("roughness.png");
        GrayImage::from_pixel(2, 2, Luma([42])).save(&roughness_path).unwrap();

        let mut material = LoadedMaterial::missing_material();
        material.maps.roughness = Some(roughness_path.clone());
        let observer = RecordingObserver::default();

        let texture = load_surface_texture(&material, &observer).unwrap();

        assert_eq!((texture.width, texture.height), (2, 2));
        assert_eq!(texture.layers, SURFACE_LAYER_COUNT);
        assert_eq!(texture.bytes.len(), 2 * 2 * 4 * 3);
        assert_eq!(texture.bytes[16], 42);
        assert_eq!(*observer.textures.borrow(), vec![roughness_path]);
    }

    #[test]
    fn unreadable_texture_names_its_path() {
        let mut material = LoadedMaterial::missing_material();
        material.maps.albedo = Some(PathBuf::from("missing/albedo.png"));

        match load_surface_texture(&material, &()) {
            Err(TracerError::Asset { path, .. }) => {
                assert_eq!(path, PathBuf::from("missing/albedo.png"))
            }
            other => panic!("unexpected result {other:?}"),
        }
    }
}
