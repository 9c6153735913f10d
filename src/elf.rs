//! Minimal ELF64 reader for dependency discovery.
//!
//! Reads the program headers and the dynamic section directly instead of
//! running `ldd` or scraping `readelf -d` output. Nothing is executed, so
//! this also works on binaries built for a different root.
//!
//! Only what dependency discovery needs is decoded: `PT_INTERP`,
//! `PT_DYNAMIC`, and the `DT_NEEDED`/`DT_RUNPATH`/`DT_RPATH` entries.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use thiserror::Error;

const ELF_MAGIC: &[u8; 4] = b"\x7fELF";
const ELFCLASS64: u8 = 2;
const ELFDATA2LSB: u8 = 1;

const PT_LOAD: u32 = 1;
const PT_DYNAMIC: u32 = 2;
const PT_INTERP: u32 = 3;

const DT_NULL: u64 = 0;
const DT_NEEDED: u64 = 1;
const DT_STRTAB: u64 = 5;
const DT_RPATH: u64 = 15;
const DT_RUNPATH: u64 = 29;

const PHDR_SIZE: usize = 56;
const DYN_SIZE: usize = 16;

/// Why a file could not be read as a dynamically linked object.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ElfError {
    #[error("not an ELF file")]
    NotElf,
    #[error("unsupported ELF variant: {0}")]
    Unsupported(&'static str),
    #[error("truncated or malformed ELF at offset {0:#x}")]
    Malformed(usize),
    #[error("statically linked")]
    Static,
    #[error("read failed: {0}")]
    Io(String),
}

/// Dynamic-linking metadata of one ELF object.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DynamicInfo {
    /// Requested program interpreter (`PT_INTERP`). Shared libraries have none.
    pub interpreter: Option<String>,
    /// `DT_NEEDED` entries in file order.
    pub needed: Vec<String>,
    /// `DT_RUNPATH` entries, or `DT_RPATH` if there is no runpath.
    pub search_paths: Vec<String>,
}

/// Read the dynamic-linking metadata of `path`.
///
/// Returns an error for anything that is not a dynamically linked ELF64
/// little-endian object. Callers treat that as "not a binary".
pub fn read_dynamic_info(path: &Path) -> Result<DynamicInfo, ElfError> {
    let mut file = File::open(path).map_err(|e| ElfError::Io(e.to_string()))?;
    let mut magic = [0u8; 4];
    if file.read_exact(&mut magic).is_err() || &magic != ELF_MAGIC {
        return Err(ElfError::NotElf);
    }
    let mut data = magic.to_vec();
    file.read_to_end(&mut data)
        .map_err(|e| ElfError::Io(e.to_string()))?;
    parse_dynamic_info(&data)
}

/// Parse dynamic-linking metadata from an in-memory ELF image.
pub fn parse_dynamic_info(data: &[u8]) -> Result<DynamicInfo, ElfError> {
    if data.len() < 4 || &data[..4] != ELF_MAGIC {
        return Err(ElfError::NotElf);
    }
    if byte_at(data, 4)? != ELFCLASS64 {
        return Err(ElfError::Unsupported("32-bit"));
    }
    if byte_at(data, 5)? != ELFDATA2LSB {
        return Err(ElfError::Unsupported("big-endian"));
    }

    let phoff = u64_at(data, 0x20)? as usize;
    let phentsize = u16_at(data, 0x36)? as usize;
    let phnum = u16_at(data, 0x38)? as usize;
    if phentsize < PHDR_SIZE {
        return Err(ElfError::Malformed(0x36));
    }

    let mut loads = Vec::new();
    let mut dynamic = None;
    let mut interpreter = None;

    for i in 0..phnum {
        let ph = i
            .checked_mul(phentsize)
            .and_then(|rel| rel.checked_add(phoff))
            .ok_or(ElfError::Malformed(0x20))?;
        let p_type = u32_at(data, ph)?;
        let offset = u64_at(data, add(ph, 8)?)? as usize;
        let vaddr = u64_at(data, add(ph, 16)?)?;
        let filesz = u64_at(data, add(ph, 32)?)? as usize;

        match p_type {
            PT_LOAD => loads.push(Segment {
                offset,
                vaddr,
                filesz,
            }),
            PT_DYNAMIC => dynamic = Some((offset, filesz)),
            PT_INTERP => {
                let raw = slice(data, offset, filesz)?;
                interpreter = Some(c_str(raw).to_string());
            }
            _ => {}
        }
    }

    let (dyn_offset, dyn_size) = dynamic.ok_or(ElfError::Static)?;

    let mut needed_offsets = Vec::new();
    let mut rpath = None;
    let mut runpath = None;
    let mut strtab_addr = None;

    let dyn_end = add(dyn_offset, dyn_size)?;
    let mut pos = dyn_offset;
    while add(pos, DYN_SIZE)? <= dyn_end {
        let tag = u64_at(data, pos)?;
        let val = u64_at(data, add(pos, 8)?)?;
        match tag {
            DT_NULL => break,
            DT_NEEDED => needed_offsets.push(val as usize),
            DT_STRTAB => strtab_addr = Some(val),
            DT_RPATH => rpath = Some(val as usize),
            DT_RUNPATH => runpath = Some(val as usize),
            _ => {}
        }
        pos += DYN_SIZE;
    }

    let mut info = DynamicInfo {
        interpreter,
        ..DynamicInfo::default()
    };

    if needed_offsets.is_empty() && rpath.is_none() && runpath.is_none() {
        return Ok(info);
    }

    let strtab_addr = strtab_addr.ok_or(ElfError::Malformed(dyn_offset))?;
    let strtab = loads
        .iter()
        .find_map(|seg| seg.file_offset(strtab_addr))
        .ok_or(ElfError::Malformed(dyn_offset))?;

    for off in needed_offsets {
        info.needed.push(string_at(data, add(strtab, off)?)?);
    }
    if let Some(off) = runpath.or(rpath) {
        info.search_paths = string_at(data, add(strtab, off)?)?
            .split(':')
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .collect();
    }

    Ok(info)
}

struct Segment {
    offset: usize,
    vaddr: u64,
    filesz: usize,
}

impl Segment {
    fn file_offset(&self, addr: u64) -> Option<usize> {
        let delta = addr.checked_sub(self.vaddr)? as usize;
        if delta < self.filesz {
            self.offset.checked_add(delta)
        } else {
            None
        }
    }
}

/// Offset arithmetic on untrusted header values.
fn add(base: usize, rel: usize) -> Result<usize, ElfError> {
    base.checked_add(rel).ok_or(ElfError::Malformed(base))
}

fn slice(data: &[u8], offset: usize, len: usize) -> Result<&[u8], ElfError> {
    offset
        .checked_add(len)
        .and_then(|end| data.get(offset..end))
        .ok_or(ElfError::Malformed(offset))
}

fn byte_at(data: &[u8], offset: usize) -> Result<u8, ElfError> {
    data.get(offset).copied().ok_or(ElfError::Malformed(offset))
}

fn u16_at(data: &[u8], offset: usize) -> Result<u16, ElfError> {
    let bytes = slice(data, offset, 2)?;
    Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
}

fn u32_at(data: &[u8], offset: usize) -> Result<u32, ElfError> {
    let bytes = slice(data, offset, 4)?;
    let mut buf = [0u8; 4];
    buf.copy_from_slice(bytes);
    Ok(u32::from_le_bytes(buf))
}

fn u64_at(data: &[u8], offset: usize) -> Result<u64, ElfError> {
    let bytes = slice(data, offset, 8)?;
    let mut buf = [0u8; 8];
    buf.copy_from_slice(bytes);
    Ok(u64::from_le_bytes(buf))
}

fn c_str(raw: &[u8]) -> &str {
    let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
    std::str::from_utf8(&raw[..end]).unwrap_or("")
}

fn string_at(data: &[u8], offset: usize) -> Result<String, ElfError> {
    let rest = data.get(offset..).ok_or(ElfError::Malformed(offset))?;
    let end = rest
        .iter()
        .position(|&b| b == 0)
        .ok_or(ElfError::Malformed(offset))?;
    std::str::from_utf8(&rest[..end])
        .map(str::to_string)
        .map_err(|_| ElfError::Malformed(offset))
}

/// Synthetic ELF images for tests.
#[doc(hidden)]
pub mod fixture {
    use super::*;

    /// Build an ELF64 image with one PT_LOAD covering the whole file, so
    /// virtual addresses equal file offsets.
    pub fn image(interp: Option<&str>, needed: &[&str], runpath: Option<&str>) -> Vec<u8> {
        let mut strtab = vec![0u8];
        let mut add = |s: &str| {
            let off = strtab.len() as u64;
            strtab.extend_from_slice(s.as_bytes());
            strtab.push(0);
            off
        };
        let needed_offs: Vec<u64> = needed.iter().map(|n| add(n)).collect();
        let runpath_off = runpath.map(&mut add);

        let phnum = 2 + usize::from(interp.is_some());
        let ph_start = 64;
        let interp_start = ph_start + phnum * PHDR_SIZE;
        let interp_bytes = interp
            .map(|s| {
                let mut bytes = s.as_bytes().to_vec();
                bytes.push(0);
                bytes
            })
            .unwrap_or_default();
        let strtab_start = interp_start + interp_bytes.len();
        let dyn_start = strtab_start + strtab.len();

        let mut dynamic = Vec::new();
        for off in &needed_offs {
            dynamic.push((DT_NEEDED, *off));
        }
        if let Some(off) = runpath_off {
            dynamic.push((DT_RUNPATH, off));
        }
        dynamic.push((DT_STRTAB, strtab_start as u64));
        dynamic.push((DT_NULL, 0));
        let total = dyn_start + dynamic.len() * DYN_SIZE;

        let mut out = vec![0u8; 64];
        out[..4].copy_from_slice(ELF_MAGIC);
        out[4] = ELFCLASS64;
        out[5] = ELFDATA2LSB;
        out[0x20..0x28].copy_from_slice(&(ph_start as u64).to_le_bytes());
        out[0x36..0x38].copy_from_slice(&(PHDR_SIZE as u16).to_le_bytes());
        out[0x38..0x3a].copy_from_slice(&(phnum as u16).to_le_bytes());

        let mut phdr = |p_type: u32, offset: usize, size: usize| {
            let mut ph = vec![0u8; PHDR_SIZE];
            ph[0..4].copy_from_slice(&p_type.to_le_bytes());
            ph[8..16].copy_from_slice(&(offset as u64).to_le_bytes());
            ph[16..24].copy_from_slice(&(offset as u64).to_le_bytes());
            ph[32..40].copy_from_slice(&(size as u64).to_le_bytes());
            out.extend_from_slice(&ph);
        };
        phdr(PT_LOAD, 0, total);
        phdr(PT_DYNAMIC, dyn_start, dynamic.len() * DYN_SIZE);
        if interp.is_some() {
            phdr(PT_INTERP, interp_start, interp_bytes.len());
        }

        out.extend_from_slice(&interp_bytes);
        out.extend_from_slice(&strtab);
        for (tag, val) in dynamic {
            out.extend_from_slice(&tag.to_le_bytes());
            out.extend_from_slice(&val.to_le_bytes());
        }
        out
    }
}
