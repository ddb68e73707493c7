//! Image-based lighting and skybox loading.
//!
//! Both inputs are KTX1 cubemap containers, the format `cmgen` produces. The
//! IBL container carries prefiltered reflections in its mip chain and the
//! irradiance as spherical harmonics in the `sh` metadata entry. The skybox
//! container only needs its first level.

use crate::{
    backend::{
        Cubemap, CubemapLevel, IblData, IndirectLightHandle, RenderBackend, SkyboxData,
        SkyboxHandle,
    },
    error::{Result, SessionError},
};

const IDENTIFIER: [u8; 12] = [
    0xAB, 0x4B, 0x54, 0x58, 0x20, 0x31, 0x31, 0xBB, 0x0D, 0x0A, 0x1A, 0x0A,
];
const ENDIANNESS: u32 = 0x0403_0201;

const GL_UNSIGNED_BYTE: u32 = 0x1401;
const GL_FLOAT: u32 = 0x1406;
const GL_HALF_FLOAT: u32 = 0x140B;
const GL_UNSIGNED_INT_10F_11F_11F_REV: u32 = 0x8C3B;
const GL_RGB: u32 = 0x1907;
const GL_RGBA: u32 = 0x1908;

/// Header fields of a KTX1 container that matter for cubemaps.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Ktx1Header {
    pub gl_type: u32,
    pub gl_type_size: u32,
    pub gl_format: u32,
    pub gl_internal_format: u32,
    pub pixel_width: u32,
    pub pixel_height: u32,
    pub pixel_depth: u32,
    pub array_elements: u32,
    pub faces: u32,
    pub mip_levels: u32,
}

/// A parsed KTX1 cubemap.
#[derive(Clone, Debug)]
pub struct Ktx1 {
    pub header: Ktx1Header,
    pub metadata: Vec<(String, Vec<u8>)>,
    pub cubemap: Cubemap,
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
    big_endian: bool,
}

impl<'a> Reader<'a> {
    fn take(&mut self, len: usize) -> std::result::Result<&'a [u8], String> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.bytes.len())
            .ok_or_else(|| format!("truncated at byte {} (wanted {} more)", self.pos, len))?;
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn u32(&mut self) -> std::result::Result<u32, String> {
        let raw: [u8; 4] = self
            .take(4)?
            .try_into()
            .map_err(|_| "short read".to_string())?;
        Ok(if self.big_endian {
            u32::from_be_bytes(raw)
        } else {
            u32::from_le_bytes(raw)
        })
    }

    fn align4(&mut self) -> std::result::Result<(), String> {
        let pad = (4 - self.pos % 4) % 4;
        self.take(pad.min(self.bytes.len() - self.pos)).map(|_| ())
    }
}

impl Ktx1 {
    /// Parse a cubemap container. `what` names the input in errors.
    pub fn parse(bytes: &[u8], what: &str) -> Result<Self> {
        Self::parse_inner(bytes).map_err(|reason| SessionError::parse(what, reason))
    }

    fn parse_inner(bytes: &[u8]) -> std::result::Result<Self, String> {
        if bytes.len() < 64 || bytes[..12] != IDENTIFIER {
            return Err("not a KTX1 container".into());
        }
        let endianness = u32::from_le_bytes([bytes[12], bytes[13], bytes[14], bytes[15]]);
        let big_endian = match endianness {
            ENDIANNESS => false,
            e if e == ENDIANNESS.swap_bytes() => true,
            other => return Err(format!("bad endianness marker {other:#010x}")),
        };
        let mut reader = Reader {
            bytes,
            pos: 16,
            big_endian,
        };

        let gl_type = reader.u32()?;
        let gl_type_size = reader.u32()?;
        let gl_format = reader.u32()?;
        let gl_internal_format = reader.u32()?;
        let _gl_base_internal_format = reader.u32()?;
        let header = Ktx1Header {
            gl_type,
            gl_type_size,
            gl_format,
            gl_internal_format,
            pixel_width: reader.u32()?,
            pixel_height: reader.u32()?,
            pixel_depth: reader.u32()?,
            array_elements: reader.u32()?,
            faces: reader.u32()?,
            mip_levels: reader.u32()?.max(1),
        };
        let key_value_bytes = reader.u32()? as usize;

        if header.faces != 6 {
            return Err(format!("expected a cubemap with 6 faces, found {}", header.faces));
        }
        if header.pixel_width == 0 || header.pixel_width != header.pixel_height {
            return Err(format!(
                "cubemap faces must be square, found {}x{}",
                header.pixel_width, header.pixel_height
            ));
        }
        if header.pixel_depth > 1 || header.array_elements > 1 {
            return Err("3D and array cubemaps are not supported".into());
        }
        let max_levels = u32::BITS - header.pixel_width.leading_zeros();
        if header.mip_levels > max_levels {
            return Err(format!(
                "{} mip levels declared, a {}px cube has at most {max_levels}",
                header.mip_levels, header.pixel_width
            ));
        }
        let texel = TexelFormat::from_header(&header)?;

        let metadata = read_metadata(reader.take(key_value_bytes)?, big_endian)?;

        let mut levels = Vec::new();
        for level in 0..header.mip_levels {
            let size = (header.pixel_width >> level).max(1);
            let image_size = reader.u32()? as usize;
            let too_large = || format!("level {level} of {size}px does not fit in memory");
            let row_bytes = (size as usize)
                .checked_mul(texel.bytes_per_texel())
                .and_then(|bytes| bytes.checked_next_multiple_of(4))
                .ok_or_else(too_large)?;
            let face_bytes = row_bytes
                .checked_mul(size as usize)
                .ok_or_else(too_large)?;
            if image_size < face_bytes {
                return Err(format!(
                    "level {level} declares {image_size} bytes per face, needs {face_bytes}"
                ));
            }
            let mut faces = Vec::with_capacity(6);
            for _ in 0..6 {
                let data = reader.take(image_size)?;
                faces.push(texel.decode_face(data, size as usize, row_bytes, big_endian));
                reader.align4()?;
            }
            reader.align4()?;
            levels.push(CubemapLevel { size, faces });
        }

        Ok(Self {
            header,
            metadata,
            cubemap: Cubemap { levels },
        })
    }

    pub fn metadata(&self, key: &str) -> Option<&[u8]> {
        self.metadata
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_slice())
    }

    /// Irradiance spherical harmonics from the `sh` entry.
    ///
    /// Without the entry, band 0 holds the average color of the first level
    /// and the higher bands are zero.
    pub fn spherical_harmonics(&self) -> Result<[[f32; 3]; 9]> {
        let Some(raw) = self.metadata("sh") else {
            log::warn!("IBL has no spherical harmonics; using its average color as ambient.");
            let mut sh = [[0.0; 3]; 9];
            sh[0] = self.average_color();
            return Ok(sh);
        };
        let text = String::from_utf8_lossy(raw);
        let values = text
            .split_whitespace()
            .map(str::parse::<f32>)
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| SessionError::parse("ibl", format!("bad spherical harmonics: {e}")))?;
        if values.len() != 27 {
            return Err(SessionError::parse(
                "ibl",
                format!("expected 27 spherical harmonics values, found {}", values.len()),
            ));
        }
        let mut sh = [[0.0; 3]; 9];
        for (band, chunk) in sh.iter_mut().zip(values.chunks_exact(3)) {
            band.copy_from_slice(chunk);
        }
        Ok(sh)
    }

    fn average_color(&self) -> [f32; 3] {
        let Some(level) = self.cubemap.levels.first() else {
            return [0.0; 3];
        };
        let mut sum = [0.0f64; 3];
        let mut count = 0usize;
        for texel in level.faces.iter().flatten() {
            for (acc, channel) in sum.iter_mut().zip(texel) {
                *acc += f64::from(*channel);
            }
            count += 1;
        }
        if count == 0 {
            return [0.0; 3];
        }
        sum.map(|c| (c / count as f64) as f32)
    }
}

fn read_metadata(
    bytes: &[u8],
    big_endian: bool,
) -> std::result::Result<Vec<(String, Vec<u8>)>, String> {
    let mut reader = Reader {
        bytes,
        pos: 0,
        big_endian,
    };
    let mut entries = Vec::new();
    while reader.pos + 4 <= bytes.len() {
        let len = reader.u32()? as usize;
        let pair = reader.take(len)?;
        let split = pair
            .iter()
            .position(|&b| b == 0)
            .ok_or("metadata key is not NUL terminated")?;
        let key = String::from_utf8_lossy(&pair[..split]).into_owned();
        let mut value = pair[split + 1..].to_vec();
        if value.last() == Some(&0) {
            value.pop();
        }
        entries.push((key, value));
        reader.align4()?;
    }
    Ok(entries)
}

#[derive(Clone, Copy, Debug)]
enum TexelFormat {
    Unorm8 { channels: usize },
    Half { channels: usize },
    Float { channels: usize },
    R11G11B10,
}

impl TexelFormat {
    fn from_header(header: &Ktx1Header) -> std::result::Result<Self, String> {
        let channels = match header.gl_format {
            GL_RGB => 3,
            GL_RGBA => 4,
            other => return Err(format!("unsupported pixel format {other:#06x}")),
        };
        match header.gl_type {
            GL_UNSIGNED_BYTE => Ok(Self::Unorm8 { channels }),
            GL_HALF_FLOAT => Ok(Self::Half { channels }),
            GL_FLOAT => Ok(Self::Float { channels }),
            GL_UNSIGNED_INT_10F_11F_11F_REV if channels == 3 => Ok(Self::R11G11B10),
            0 => Err(format!(
                "compressed internal format {:#06x} is not supported",
                header.gl_internal_format
            )),
            other => Err(format!("unsupported pixel type {other:#06x}")),
        }
    }

    fn bytes_per_texel(self) -> usize {
        match self {
            Self::Unorm8 { channels } => channels,
            Self::Half { channels } => channels * 2,
            Self::Float { channels } => channels * 4,
            Self::R11G11B10 => 4,
        }
    }

    fn decode_face(self, data: &[u8], size: usize, row_bytes: usize, big_endian: bool) -> Vec<[f32; 4]> {
        let stride = self.bytes_per_texel();
        let mut texels = Vec::with_capacity(size * size);
        for row in data.chunks(row_bytes).take(size) {
            for raw in row.chunks_exact(stride).take(size) {
                texels.push(self.decode_texel(raw, big_endian));
            }
        }
        texels
    }

    fn decode_texel(self, raw: &[u8], big_endian: bool) -> [f32; 4] {
        let u16_at = |i: usize| {
            let b = [raw[i * 2], raw[i * 2 + 1]];
            if big_endian {
                u16::from_be_bytes(b)
            } else {
                u16::from_le_bytes(b)
            }
        };
        let u32_at = |i: usize| {
            let b = [raw[i * 4], raw[i * 4 + 1], raw[i * 4 + 2], raw[i * 4 + 3]];
            if big_endian {
                u32::from_be_bytes(b)
            } else {
                u32::from_le_bytes(b)
            }
        };
        let mut out = [0.0, 0.0, 0.0, 1.0];
        match self {
            Self::Unorm8 { channels } => {
                for (c, slot) in out.iter_mut().enumerate().take(channels) {
                    *slot = f32::from(raw[c]) / 255.0;
                }
            }
            Self::Half { channels } => {
                for (c, slot) in out.iter_mut().enumerate().take(channels) {
                    *slot = half_to_f32(u16_at(c));
                }
            }
            Self::Float { channels } => {
                for (c, slot) in out.iter_mut().enumerate().take(channels) {
                    *slot = f32::from_bits(u32_at(c));
                }
            }
            Self::R11G11B10 => {
                let packed = u32_at(0);
                out[0] = small_float(packed & 0x7FF, 6);
                out[1] = small_float((packed >> 11) & 0x7FF, 6);
                out[2] = small_float((packed >> 22) & 0x3FF, 5);
            }
        }
        out
    }
}

fn half_to_f32(bits: u16) -> f32 {
    let sign = if bits & 0x8000 != 0 { -1.0 } else { 1.0 };
    let exponent = i32::from((bits >> 10) & 0x1F);
    let mantissa = f32::from(bits & 0x3FF);
    sign * match exponent {
        0 => mantissa * 2f32.powi(-24),
        31 if mantissa == 0.0 => f32::INFINITY,
        31 => f32::NAN,
        e => (1.0 + mantissa / 1024.0) * 2f32.powi(e - 15),
    }
}

/// Unsigned 5-bit-exponent float with `mantissa_bits` of mantissa.
fn small_float(bits: u32, mantissa_bits: u32) -> f32 {
    let exponent = (bits >> mantissa_bits) as i32;
    let scale = (1u32 << mantissa_bits) as f32;
    let mantissa = (bits & ((1 << mantissa_bits) - 1)) as f32;
    match exponent {
        0 => mantissa / scale * 2f32.powi(-14),
        31 if mantissa == 0.0 => f32::INFINITY,
        31 => f32::NAN,
        e => (1.0 + mantissa / scale) * 2f32.powi(e - 15),
    }
}

/// The indirect light and skybox installed in the scene.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EnvironmentState {
    pub ibl: IndirectLightHandle,
    pub skybox: SkyboxHandle,
}

impl EnvironmentState {
    pub fn as_pair(&self) -> (IndirectLightHandle, SkyboxHandle) {
        (self.ibl, self.skybox)
    }

    /// Release both backend objects. The caller uninstalls them first.
    pub fn destroy<B: RenderBackend>(self, backend: &mut B) {
        backend.destroy_skybox(self.skybox);
        backend.destroy_indirect_light(self.ibl);
    }
}

/// An environment is always an IBL and a skybox together.
pub fn require_pair(ibl: &[u8], skybox: &[u8]) -> Result<()> {
    if ibl.is_empty() || skybox.is_empty() {
        return Err(SessionError::usage(
            "environment needs both an IBL and a skybox buffer",
        ));
    }
    Ok(())
}

/// Parse both containers, then create the backend objects.
///
/// Nothing is created unless both buffers parse. If the skybox cannot be
/// created the freshly created indirect light is released again. The result
/// is not installed in the scene.
pub fn load_environment<B: RenderBackend>(
    backend: &mut B,
    ibl: &[u8],
    skybox: &[u8],
    intensity: f32,
) -> Result<EnvironmentState> {
    require_pair(ibl, skybox)?;
    let ibl_ktx = Ktx1::parse(ibl, "ibl")?;
    let skybox_ktx = Ktx1::parse(skybox, "skybox")?;
    let ibl_data = IblData {
        irradiance_sh: ibl_ktx.spherical_harmonics()?,
        reflections: ibl_ktx.cubemap,
        intensity,
    };
    let mut skybox_cubemap = skybox_ktx.cubemap;
    skybox_cubemap.levels.truncate(1);
    let skybox_data = SkyboxData {
        cubemap: skybox_cubemap,
    };

    let light = backend.create_indirect_light(&ibl_data)?;
    let skybox = match backend.create_skybox(&skybox_data) {
        Ok(skybox) => skybox,
        Err(e) => {
            backend.destroy_indirect_light(light);
            return Err(e.into());
        }
    };
    log::info!(
        "Environment created: reflections {}px x {} levels, skybox {}px",
        ibl_data.reflections.size(),
        ibl_data.reflections.levels.len(),
        skybox_data.cubemap.size()
    );
    Ok(EnvironmentState { ibl: light, skybox })
}
