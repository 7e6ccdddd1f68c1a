//! HSACO (AMDGPU code object) validation.
//!
//! A HSACO image is an ELF64 shared object targeting `EM_AMDGPU` with the
//! HSA OS ABI. Only the identification header and section table bounds are
//! checked here; symbol resolution is the driver's job.

use bytemuck::{Pod, Zeroable};

use crate::error::{HalError, HalResult};

pub const ELF_MAGIC: [u8; 4] = [0x7f, b'E', b'L', b'F'];
pub const ELFCLASS64: u8 = 2;
pub const ELFDATA2LSB: u8 = 1;
pub const EV_CURRENT: u8 = 1;
pub const ELFOSABI_AMDGPU_HSA: u8 = 64;
pub const ET_DYN: u16 = 3;
pub const EM_AMDGPU: u16 = 224;
pub const EF_AMDGPU_MACH: u32 = 0x0ff;

const EI_CLASS: usize = 4;
const EI_DATA: usize = 5;
const EI_VERSION: usize = 6;
const EI_OSABI: usize = 7;
const EI_ABIVERSION: usize = 8;

/// ELF64 file header, field-for-field.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct Elf64Header {
    pub e_ident: [u8; 16],
    pub e_type: u16,
    pub e_machine: u16,
    pub e_version: u32,
    pub e_entry: u64,
    pub e_phoff: u64,
    pub e_shoff: u64,
    pub e_flags: u32,
    pub e_ehsize: u16,
    pub e_phentsize: u16,
    pub e_phnum: u16,
    pub e_shentsize: u16,
    pub e_shnum: u16,
    pub e_shstrndx: u16,
}

pub const ELF64_HEADER_SIZE: usize = std::mem::size_of::<Elf64Header>();

/// Code object ABI version (`e_ident[EI_ABIVERSION]`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CodeObjectVersion {
    V2,
    V3,
    V4,
    V5,
    V6,
}

impl CodeObjectVersion {
    pub fn from_abi_version(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(Self::V2),
            1 => Some(Self::V3),
            2 => Some(Self::V4),
            3 => Some(Self::V5),
            4 => Some(Self::V6),
            _ => None,
        }
    }
}

/// AMDGPU architecture encoded in `e_flags & EF_AMDGPU_MACH`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GfxTarget {
    Gfx900,
    Gfx906,
    Gfx908,
    Gfx90a,
    Gfx940,
    Gfx941,
    Gfx942,
    Gfx1030,
    Gfx1100,
    Gfx1101,
    Gfx1102,
    Gfx1200,
    Gfx1201,
    Unknown(u32),
}

impl GfxTarget {
    pub fn from_mach(mach: u32) -> Self {
        match mach {
            0x02c => Self::Gfx900,
            0x02f => Self::Gfx906,
            0x030 => Self::Gfx908,
            0x03f => Self::Gfx90a,
            0x040 => Self::Gfx940,
            0x04b => Self::Gfx941,
            0x04c => Self::Gfx942,
            0x036 => Self::Gfx1030,
            0x041 => Self::Gfx1100,
            0x046 => Self::Gfx1101,
            0x047 => Self::Gfx1102,
            0x048 => Self::Gfx1200,
            0x04e => Self::Gfx1201,
            other => Self::Unknown(other),
        }
    }

    pub fn name(&self) -> Option<&'static str> {
        Some(match self {
            Self::Gfx900 => "gfx900",
            Self::Gfx906 => "gfx906",
            Self::Gfx908 => "gfx908",
            Self::Gfx90a => "gfx90a",
            Self::Gfx940 => "gfx940",
            Self::Gfx941 => "gfx941",
            Self::Gfx942 => "gfx942",
            Self::Gfx1030 => "gfx1030",
            Self::Gfx1100 => "gfx1100",
            Self::Gfx1101 => "gfx1101",
            Self::Gfx1102 => "gfx1102",
            Self::Gfx1200 => "gfx1200",
            Self::Gfx1201 => "gfx1201",
            Self::Unknown(_) => return None,
        })
    }
}

impl std::fmt::Display for GfxTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (self.name(), self) {
            (Some(name), _) => f.write_str(name),
            (None, Self::Unknown(mach)) => write!(f, "mach 0x{mach:03x}"),
            (None, _) => f.write_str("unknown"),
        }
    }
}

/// A validated view over a HSACO image.
#[derive(Debug, Clone, Copy)]
pub struct HsacoImage<'a> {
    bytes: &'a [u8],
    header: Elf64Header,
}

impl<'a> HsacoImage<'a> {
    pub fn parse(bytes: &'a [u8]) -> HalResult<Self> {
        if bytes.len() < ELF64_HEADER_SIZE {
            return Err(HalError::InvalidArgument(format!(
                "HSACO image is {} bytes, smaller than an ELF64 header",
                bytes.len()
            )));
        }
        let header: Elf64Header = bytemuck::pod_read_unaligned(&bytes[..ELF64_HEADER_SIZE]);
        let ident = &header.e_ident;

        if ident[..4] != ELF_MAGIC {
            return Err(HalError::InvalidArgument(
                "HSACO image is not an ELF file".to_string(),
            ));
        }
        if ident[EI_CLASS] != ELFCLASS64 || ident[EI_DATA] != ELFDATA2LSB {
            return Err(HalError::InvalidArgument(format!(
                "HSACO image must be ELF64 little-endian (class {}, data {})",
                ident[EI_CLASS], ident[EI_DATA]
            )));
        }
        if ident[EI_OSABI] != ELFOSABI_AMDGPU_HSA {
            return Err(HalError::InvalidArgument(format!(
                "HSACO image has OS ABI {}, expected AMDGPU HSA ({ELFOSABI_AMDGPU_HSA})",
                ident[EI_OSABI]
            )));
        }
        if header.e_machine != EM_AMDGPU {
            return Err(HalError::InvalidArgument(format!(
                "HSACO image targets machine {}, expected EM_AMDGPU ({EM_AMDGPU})",
                header.e_machine
            )));
        }
        if header.e_type != ET_DYN {
            return Err(HalError::InvalidArgument(format!(
                "HSACO image has ELF type {}, expected a shared object",
                header.e_type
            )));
        }

        let table_size = u64::from(header.e_shnum) * u64::from(header.e_shentsize);
        let table_end = header.e_shoff.checked_add(table_size);
        if header.e_shnum > 0 && table_end.map_or(true, |end| end > bytes.len() as u64) {
            return Err(HalError::InvalidArgument(format!(
                "HSACO section table ({} entries at offset {}) extends past the {}-byte image",
                header.e_shnum,
                header.e_shoff,
                bytes.len()
            )));
        }

        Ok(Self { bytes, header })
    }

    pub fn bytes(&self) -> &'a [u8] {
        self.bytes
    }

    pub fn header(&self) -> &Elf64Header {
        &self.header
    }

    pub fn code_object_version(&self) -> Option<CodeObjectVersion> {
        CodeObjectVersion::from_abi_version(self.header.e_ident[EI_ABIVERSION])
    }

    pub fn target(&self) -> GfxTarget {
        GfxTarget::from_mach(self.header.e_flags & EF_AMDGPU_MACH)
    }
}

/// Builds the smallest image [`HsacoImage::parse`] accepts: a bare header
/// with no sections.
pub fn minimal_image(mach: u32) -> Vec<u8> {
    let mut e_ident = [0u8; 16];
    e_ident[..4].copy_from_slice(&ELF_MAGIC);
    e_ident[EI_CLASS] = ELFCLASS64;
    e_ident[EI_DATA] = ELFDATA2LSB;
    e_ident[EI_VERSION] = EV_CURRENT;
    e_ident[EI_OSABI] = ELFOSABI_AMDGPU_HSA;
    e_ident[EI_ABIVERSION] = 3;
    let header = Elf64Header {
        e_ident,
        e_type: ET_DYN,
        e_machine: EM_AMDGPU,
        e_version: u32::from(EV_CURRENT),
        e_flags: mach & EF_AMDGPU_MACH,
        e_ehsize: ELF64_HEADER_SIZE as u16,
        ..Elf64Header::zeroed()
    };
    bytemuck::bytes_of(&header).to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn patched(mutate: impl FnOnce(&mut Elf64Header)) -> Vec<u8> {
        let mut header: Elf64Header = bytemuck::pod_read_unaligned(&minimal_image(0x03f));
        mutate(&mut header);
        bytemuck::bytes_of(&header).to_vec()
    }

    #[test]
    fn test_header_is_64_bytes() {
        assert_eq!(ELF64_HEADER_SIZE, 64);
    }

    #[test]
    fn test_minimal_image_parses() {
        let bytes = minimal_image(0x03f);
        let image = HsacoImage::parse(&bytes).unwrap();
        assert_eq!(image.target(), GfxTarget::Gfx90a);
        assert_eq!(image.code_object_version(), Some(CodeObjectVersion::V5));
        assert_eq!(image.bytes().len(), 64);
        assert_eq!(image.header().e_ident[EI_VERSION], EV_CURRENT);
        assert_eq!(image.header().e_version, u32::from(EV_CURRENT));
    }

    #[test]
    fn test_unknown_target_is_not_an_error() {
        let bytes = minimal_image(0x0fe);
        let image = HsacoImage::parse(&bytes).unwrap();
        assert_eq!(image.target(), GfxTarget::Unknown(0x0fe));
        assert_eq!(image.target().to_string(), "mach 0x0fe");
    }

    #[test]
    fn test_rejects_truncated() {
        let bytes = minimal_image(0x041);
        assert!(HsacoImage::parse(&bytes[..63]).is_err());
        assert!(HsacoImage::parse(&[]).is_err());
    }

    #[test]
    fn test_rejects_bad_identification() {
        let bad_magic = patched(|h| h.e_ident[0] = 0);
        let bad_class = patched(|h| h.e_ident[EI_CLASS] = 1);
        let bad_abi = patched(|h| h.e_ident[EI_OSABI] = 0);
        let bad_machine = patched(|h| h.e_machine = 62);
        let bad_type = patched(|h| h.e_type = 1);
        for bytes in [bad_magic, bad_class, bad_abi, bad_machine, bad_type] {
            assert!(HsacoImage::parse(&bytes).is_err());
        }
    }

    #[test]
    fn test_rejects_section_table_past_end() {
        let bytes = patched(|h| {
            h.e_shoff = 64;
            h.e_shnum = 4;
            h.e_shentsize = 64;
        });
        let err = HsacoImage::parse(&bytes).unwrap_err();
        assert!(err.to_string().contains("section table"));

        let overflow = patched(|h| {
            h.e_shoff = u64::MAX;
            h.e_shnum = 1;
            h.e_shentsize = 64;
        });
        assert!(HsacoImage::parse(&overflow).is_err());
    }

    #[test]
    fn test_target_names() {
        assert_eq!(GfxTarget::from_mach(0x041).to_string(), "gfx1100");
        assert_eq!(GfxTarget::from_mach(0x04e).name(), Some("gfx1201"));
    }
}
