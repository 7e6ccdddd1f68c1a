//! Executable container format.
//!
//! ```text
//! magic        "HIPE"
//! version      u32
//! module_count u32, then per module:  image blob (HSACO)
//! source_count u32, then per source:  path str, content blob
//! export_count u32, then per export:
//!     module_ordinal u32
//!     kernel_name    str
//!     block_dims     u32 x3
//!     shared_memory  u32
//!     flags          u32   (bit0: debug name, bit1: source location)
//!     [debug name    str]
//!     [location      file str, line u32]
//! ```
//!
//! Integers are little-endian `u32`; `str` and `blob` are a `u32` length
//! followed by that many bytes. Parsing borrows from the input buffer.

use crate::error::{try_with_capacity, HalError, HalResult};
use crate::hsaco::HsacoImage;

pub const EXECUTABLE_MAGIC: [u8; 4] = *b"HIPE";
pub const EXECUTABLE_VERSION: u32 = 1;

const FLAG_DEBUG_NAME: u32 = 1 << 0;
const FLAG_LOCATION: u32 = 1 << 1;
const KNOWN_FLAGS: u32 = FLAG_DEBUG_NAME | FLAG_LOCATION;

// Smallest possible encodings, used to bound counts before allocating.
const MIN_MODULE_SIZE: usize = 4;
const MIN_SOURCE_SIZE: usize = 8;
const MIN_EXPORT_SIZE: usize = 4 + 4 + 12 + 4 + 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModuleDef<'a> {
    pub hsaco_image: &'a [u8],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceFileDef<'a> {
    pub path: &'a str,
    pub content: &'a [u8],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileLineLoc<'a> {
    pub filename: &'a str,
    pub line: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExportDebugInfo<'a> {
    pub name: Option<&'a str>,
    pub location: Option<FileLineLoc<'a>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportDef<'a> {
    pub module_ordinal: u32,
    pub kernel_name: &'a str,
    pub block_dims: [u32; 3],
    pub block_shared_memory_size: u32,
    pub debug_info: ExportDebugInfo<'a>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ExecutableDef<'a> {
    pub modules: Vec<ModuleDef<'a>>,
    pub source_files: Vec<SourceFileDef<'a>>,
    pub exports: Vec<ExportDef<'a>>,
}

struct ByteReader<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> ByteReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, offset: 0 }
    }

    fn remaining(&self) -> usize {
        self.data.len() - self.offset
    }

    fn bytes(&mut self, len: usize, what: &str) -> HalResult<&'a [u8]> {
        if len > self.remaining() {
            return Err(HalError::InvalidArgument(format!(
                "executable data truncated at offset {} reading {what} ({len} bytes wanted, {} left)",
                self.offset,
                self.remaining()
            )));
        }
        let slice = &self.data[self.offset..self.offset + len];
        self.offset += len;
        Ok(slice)
    }

    fn u32(&mut self, what: &str) -> HalResult<u32> {
        let raw = self.bytes(4, what)?;
        Ok(u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]))
    }

    fn blob(&mut self, what: &str) -> HalResult<&'a [u8]> {
        let len = self.u32(what)? as usize;
        self.bytes(len, what)
    }

    fn str(&mut self, what: &str) -> HalResult<&'a str> {
        let at = self.offset;
        let raw = self.blob(what)?;
        std::str::from_utf8(raw).map_err(|_| {
            HalError::InvalidArgument(format!("{what} at offset {at} is not valid UTF-8"))
        })
    }

    /// Reads an element count and rejects counts the rest of the buffer
    /// cannot possibly hold.
    fn count(&mut self, what: &str, min_element_size: usize) -> HalResult<usize> {
        let count = self.u32(what)? as usize;
        if count.saturating_mul(min_element_size) > self.remaining() {
            return Err(HalError::InvalidArgument(format!(
                "{what} of {count} exceeds the {} remaining bytes",
                self.remaining()
            )));
        }
        Ok(count)
    }
}

impl<'a> ExecutableDef<'a> {
    /// Parses and verifies an executable container.
    ///
    /// Every failure is [`HalError::InvalidArgument`] except host allocation
    /// failure, which is [`HalError::ResourceExhausted`].
    pub fn parse(data: &'a [u8]) -> HalResult<Self> {
        if data.is_empty() {
            return Err(HalError::InvalidArgument(
                "executable data is empty".to_string(),
            ));
        }
        let mut r = ByteReader::new(data);

        let magic = r.bytes(4, "magic")?;
        if magic != EXECUTABLE_MAGIC {
            return Err(HalError::InvalidArgument(format!(
                "executable data has magic {magic:02x?}, expected \"HIPE\""
            )));
        }
        let version = r.u32("version")?;
        if version != EXECUTABLE_VERSION {
            return Err(HalError::InvalidArgument(format!(
                "unsupported executable format version {version}, expected {EXECUTABLE_VERSION}"
            )));
        }

        let module_count = r.count("module count", MIN_MODULE_SIZE)?;
        let mut modules = try_with_capacity(module_count)?;
        for _ in 0..module_count {
            modules.push(ModuleDef {
                hsaco_image: r.blob("module image")?,
            });
        }

        let source_count = r.count("source file count", MIN_SOURCE_SIZE)?;
        let mut source_files = try_with_capacity(source_count)?;
        for _ in 0..source_count {
            let path = r.str("source file path")?;
            let content = r.blob("source file content")?;
            source_files.push(SourceFileDef { path, content });
        }

        let export_count = r.count("export count", MIN_EXPORT_SIZE)?;
        let mut exports = try_with_capacity(export_count)?;
        for _ in 0..export_count {
            let module_ordinal = r.u32("export module ordinal")?;
            let kernel_name = r.str("export kernel name")?;
            let block_dims = [
                r.u32("block dim x")?,
                r.u32("block dim y")?,
                r.u32("block dim z")?,
            ];
            let block_shared_memory_size = r.u32("shared memory size")?;
            let flags = r.u32("export flags")?;
            if flags & !KNOWN_FLAGS != 0 {
                return Err(HalError::InvalidArgument(format!(
                    "export '{kernel_name}' has unknown flags 0x{flags:x}"
                )));
            }
            let mut debug_info = ExportDebugInfo::default();
            if flags & FLAG_DEBUG_NAME != 0 {
                debug_info.name = Some(r.str("export debug name")?);
            }
            if flags & FLAG_LOCATION != 0 {
                let filename = r.str("export source file")?;
                let line = r.u32("export source line")?;
                debug_info.location = Some(FileLineLoc { filename, line });
            }
            exports.push(ExportDef {
                module_ordinal,
                kernel_name,
                block_dims,
                block_shared_memory_size,
                debug_info,
            });
        }

        if r.remaining() != 0 {
            return Err(HalError::InvalidArgument(format!(
                "{} trailing bytes after the last export",
                r.remaining()
            )));
        }

        let def = Self {
            modules,
            source_files,
            exports,
        };
        def.verify()?;
        Ok(def)
    }

    /// Structural checks that do not need a device.
    pub fn verify(&self) -> HalResult<()> {
        if self.modules.is_empty() {
            return Err(HalError::InvalidArgument(
                "executable contains no modules".to_string(),
            ));
        }
        for (i, module) in self.modules.iter().enumerate() {
            HsacoImage::parse(module.hsaco_image)
                .map_err(|e| e.annotate(format_args!("module {i}")))?;
        }

        if self.exports.is_empty() {
            return Err(HalError::InvalidArgument(
                "executable contains no entry points".to_string(),
            ));
        }
        for (i, export) in self.exports.iter().enumerate() {
            if export.kernel_name.is_empty() {
                return Err(HalError::InvalidArgument(format!(
                    "export {i} has an empty kernel name"
                )));
            }
            if export.kernel_name.contains('\0') {
                return Err(HalError::InvalidArgument(format!(
                    "export {i} kernel name contains a NUL byte"
                )));
            }
            if export.module_ordinal as usize >= self.modules.len() {
                return Err(HalError::InvalidArgument(format!(
                    "export {i} ('{}') references module {} but only {} are present",
                    export.kernel_name,
                    export.module_ordinal,
                    self.modules.len()
                )));
            }
            if export.block_dims.iter().any(|&d| d == 0) {
                return Err(HalError::InvalidArgument(format!(
                    "export {i} ('{}') has a zero block dimension {:?}",
                    export.kernel_name, export.block_dims
                )));
            }
        }

        for (i, source) in self.source_files.iter().enumerate() {
            if source.path.is_empty() {
                return Err(HalError::InvalidArgument(format!(
                    "source file {i} has an empty path"
                )));
            }
        }
        Ok(())
    }

    pub fn source_file(&self, path: &str) -> Option<&SourceFileDef<'a>> {
        self.source_files.iter().find(|s| s.path == path)
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&EXECUTABLE_MAGIC);
        put_u32(&mut out, EXECUTABLE_VERSION);

        put_u32(&mut out, self.modules.len() as u32);
        for module in &self.modules {
            put_blob(&mut out, module.hsaco_image);
        }

        put_u32(&mut out, self.source_files.len() as u32);
        for source in &self.source_files {
            put_blob(&mut out, source.path.as_bytes());
            put_blob(&mut out, source.content);
        }

        put_u32(&mut out, self.exports.len() as u32);
        for export in &self.exports {
            put_u32(&mut out, export.module_ordinal);
            put_blob(&mut out, export.kernel_name.as_bytes());
            for dim in export.block_dims {
                put_u32(&mut out, dim);
            }
            put_u32(&mut out, export.block_shared_memory_size);

            let debug = &export.debug_info;
            let mut flags = 0;
            if debug.name.is_some() {
                flags |= FLAG_DEBUG_NAME;
            }
            if debug.location.is_some() {
                flags |= FLAG_LOCATION;
            }
            put_u32(&mut out, flags);
            if let Some(name) = debug.name {
                put_blob(&mut out, name.as_bytes());
            }
            if let Some(loc) = debug.location {
                put_blob(&mut out, loc.filename.as_bytes());
                put_u32(&mut out, loc.line);
            }
        }
        out
    }
}

fn put_u32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_le_bytes());
}

fn put_blob(out: &mut Vec<u8>, bytes: &[u8]) {
    put_u32(out, bytes.len() as u32);
    out.extend_from_slice(bytes);
}
