//! Inspection of the thread-local storage layout of an ELF image.
//!
//! The linker places zero-initialized TLS variables in `SHT_NOBITS` sections flagged `SHF_TLS`
//! (`.tbss`) and initialized ones in `SHF_TLS` data sections (`.tdata`). At run time only the
//! `PT_TLS` segment matters: it describes the template that gets copied into every new thread's
//! TLS block, `filesz` bytes of initialized data followed by zeroes up to `memsz`.

use std::{fmt, path::Path};

use elf::{
    abi::{
        DF_1_PIE, DT_FLAGS_1, EM_AARCH64, EM_X86_64, ET_DYN, ET_EXEC, PT_TLS, SHF_TLS, SHT_NOBITS,
        STT_TLS,
    },
    endian::AnyEndian,
    ElfBytes,
};
use serde::Serialize;
use tracing::{debug, trace, warn};

use crate::{InspectError, InspectErrorKind};

/// Name used for images that were parsed from memory.
pub const ANONYMOUS_IMAGE: &str = "<memory>";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Machine {
    X86_64,
    Aarch64,
    Other(u16),
}

impl From<u16> for Machine {
    fn from(value: u16) -> Self {
        match value {
            EM_X86_64 => Machine::X86_64,
            EM_AARCH64 => Machine::Aarch64,
            other => Machine::Other(other),
        }
    }
}

impl fmt::Display for Machine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Machine::X86_64 => write!(f, "x86_64"),
            Machine::Aarch64 => write!(f, "aarch64"),
            Machine::Other(m) => write!(f, "machine({})", m),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionKind {
    /// `SHT_NOBITS`, occupies no file space (`.tbss`).
    ZeroInit,
    /// Carries initial values in the file (`.tdata`).
    Initialized,
}

#[derive(Debug, Clone, Serialize)]
pub struct TlsSection {
    pub name: String,
    pub kind: SectionKind,
    pub addr: u64,
    pub offset: u64,
    pub size: u64,
    pub align: u64,
    #[serde(skip)]
    pub data: Vec<u8>,
}

/// The `PT_TLS` segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TlsTemplate {
    pub vaddr: u64,
    pub filesz: u64,
    pub memsz: u64,
    pub align: u64,
}

impl TlsTemplate {
    /// Size of the zero-filled tail of each thread's block.
    pub fn zero_fill(&self) -> u64 {
        self.memsz.saturating_sub(self.filesz)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TlsSymbol {
    pub name: String,
    pub offset: u64,
    pub size: u64,
}

/// What [TlsImage::verify] should require beyond the basic TLS layout.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Expectations {
    pub require_pie: bool,
    /// A value that must appear in the initialized TLS data, in the image's byte order.
    pub tdata_value: Option<u32>,
}

/// TLS-related facts about one ELF image.
#[derive(Debug, Clone, Serialize)]
pub struct TlsImage {
    pub name: String,
    pub machine: Machine,
    pub elf_type: u16,
    pub big_endian: bool,
    pub pie: bool,
    pub sections: Vec<TlsSection>,
    pub template: Option<TlsTemplate>,
    pub symbols: Vec<TlsSymbol>,
}

impl TlsImage {
    /// Inspect an image held in memory.
    pub fn parse(data: &[u8]) -> Result<Self, InspectError> {
        Self::parse_named(ANONYMOUS_IMAGE, data)
    }

    /// Read and inspect the file at `path`.
    pub fn read(path: impl AsRef<Path>) -> Result<Self, InspectError> {
        let path = path.as_ref();
        let data = std::fs::read(path).map_err(|err| InspectErrorKind::Io {
            path: path.display().to_string(),
            err,
        })?;
        Self::parse_named(&path.display().to_string(), &data)
    }

    pub fn parse_named(name: &str, data: &[u8]) -> Result<Self, InspectError> {
        let file = ElfBytes::<AnyEndian>::minimal_parse(data)?;
        let machine = Machine::from(file.ehdr.e_machine);
        let elf_type = file.ehdr.e_type;
        let big_endian = matches!(file.ehdr.endianness, AnyEndian::Big);
        trace!("{}: {} type {} big_endian={}", name, machine, elf_type, big_endian);

        if elf_type != ET_EXEC && elf_type != ET_DYN {
            debug!("{}: not an executable or shared object (type {})", name, elf_type);
        }

        let sections = Self::tls_sections(name, &file)?;
        let template = file
            .segments()
            .and_then(|phdrs| phdrs.iter().find(|phdr| phdr.p_type == PT_TLS))
            .map(|phdr| TlsTemplate {
                vaddr: phdr.p_vaddr,
                filesz: phdr.p_filesz,
                memsz: phdr.p_memsz,
                align: phdr.p_align,
            });
        if let Some(ref tm) = template {
            debug!(
                "{}: PT_TLS template at {:#x}, {} bytes initialized, {} bytes zeroed",
                name,
                tm.vaddr,
                tm.filesz,
                tm.zero_fill()
            );
        }

        Ok(Self {
            name: name.to_string(),
            machine,
            elf_type,
            big_endian,
            pie: elf_type == ET_DYN && Self::has_pie_flag(&file)?,
            sections,
            template,
            symbols: Self::tls_symbols(&file)?,
        })
    }

    fn tls_sections(
        name: &str,
        file: &ElfBytes<'_, AnyEndian>,
    ) -> Result<Vec<TlsSection>, InspectError> {
        let (shdrs, strtab) = file.section_headers_with_strtab()?;
        let Some(shdrs) = shdrs else {
            warn!("{}: no section headers", name);
            return Ok(vec![]);
        };

        let mut sections = vec![];
        for shdr in shdrs.iter().filter(|s| s.sh_flags & SHF_TLS as u64 != 0) {
            let secname = strtab
                .as_ref()
                .and_then(|strtab| strtab.get(shdr.sh_name as usize).ok())
                .unwrap_or("<invalid>")
                .to_string();
            let (kind, data) = if shdr.sh_type == SHT_NOBITS {
                (SectionKind::ZeroInit, vec![])
            } else {
                let (data, _) = file.section_data(&shdr)?;
                (SectionKind::Initialized, data.to_vec())
            };
            debug!(
                "{}: TLS section {} ({:?}, {} bytes)",
                name, secname, kind, shdr.sh_size
            );
            sections.push(TlsSection {
                name: secname,
                kind,
                addr: shdr.sh_addr,
                offset: shdr.sh_offset,
                size: shdr.sh_size,
                align: shdr.sh_addralign,
                data,
            });
        }
        Ok(sections)
    }

    fn has_pie_flag(file: &ElfBytes<'_, AnyEndian>) -> Result<bool, InspectError> {
        let Some(dynamic) = file.dynamic()? else {
            return Ok(false);
        };
        Ok(dynamic
            .iter()
            .find(|ent| ent.d_tag == DT_FLAGS_1)
            .map_or(false, |ent| ent.d_val() & DF_1_PIE as u64 != 0))
    }

    fn tls_symbols(file: &ElfBytes<'_, AnyEndian>) -> Result<Vec<TlsSymbol>, InspectError> {
        // Stripped images have no .symtab, which is fine.
        let Some((symtab, strtab)) = file.symbol_table()? else {
            return Ok(vec![]);
        };
        Ok(symtab
            .iter()
            .filter(|sym| sym.st_symtype() == STT_TLS)
            .map(|sym| TlsSymbol {
                name: strtab.get(sym.st_name as usize).unwrap_or("<invalid>").to_string(),
                offset: sym.st_value,
                size: sym.st_size,
            })
            .collect())
    }

    pub fn zero_init_sections(&self) -> impl Iterator<Item = &TlsSection> {
        self.sections
            .iter()
            .filter(|s| s.kind == SectionKind::ZeroInit)
    }

    pub fn initialized_sections(&self) -> impl Iterator<Item = &TlsSection> {
        self.sections
            .iter()
            .filter(|s| s.kind == SectionKind::Initialized)
    }

    /// TLS symbols whose (possibly mangled) name contains `needle`.
    pub fn symbols_matching<'a>(
        &'a self,
        needle: &'a str,
    ) -> impl Iterator<Item = &'a TlsSymbol> + 'a {
        self.symbols.iter().filter(move |sym| sym.name.contains(needle))
    }

    /// The TLS section holding `sym`.
    ///
    /// In linked images a TLS symbol's value is its offset into the `PT_TLS` template, so the
    /// section ranges are taken relative to the template's address.
    pub fn section_of(&self, sym: &TlsSymbol) -> Option<&TlsSection> {
        let tm = self.template?;
        self.sections.iter().find(|s| {
            let Some(start) = s.addr.checked_sub(tm.vaddr) else {
                return false;
            };
            (start..start + s.size).contains(&sym.offset)
        })
    }

    /// Does any initialized TLS section contain `value`, encoded in this image's byte order?
    pub fn tdata_contains(&self, value: u32) -> bool {
        let needle = if self.big_endian {
            value.to_be_bytes()
        } else {
            value.to_le_bytes()
        };
        self.initialized_sections()
            .any(|s| s.data.windows(needle.len()).any(|w| w == needle))
    }

    /// Check the TLS layout, reporting every failed check at once.
    pub fn verify(&self, expect: &Expectations) -> Result<(), InspectError> {
        let mut errs: Vec<InspectError> = vec![];

        if self.zero_init_sections().next().is_none() {
            errs.push(InspectErrorKind::MissingZeroInit.into());
        }
        if self.initialized_sections().next().is_none() {
            errs.push(InspectErrorKind::MissingInitialized.into());
        }
        match self.template {
            None => errs.push(InspectErrorKind::MissingTemplate.into()),
            Some(tm) if tm.filesz > tm.memsz => errs.push(
                InspectErrorKind::TemplateSize {
                    filesz: tm.filesz,
                    memsz: tm.memsz,
                }
                .into(),
            ),
            Some(_) => {}
        }
        if expect.require_pie && !self.pie {
            errs.push(InspectErrorKind::NotPie.into());
        }
        if let Some(value) = expect.tdata_value {
            if !self.tdata_contains(value) {
                errs.push(InspectErrorKind::ConstantNotFound { value }.into());
            }
        }

        InspectError::collect(
            InspectErrorKind::VerifyFailed {
                name: self.name.clone(),
            },
            errs,
        )
    }
}

impl fmt::Display for TlsImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{}: {} type={} pie={}",
            self.name, self.machine, self.elf_type, self.pie
        )?;
        for s in &self.sections {
            writeln!(
                f,
                "  section {:<12} {:<11} addr={:#x} size={:#x} align={}",
                s.name,
                match s.kind {
                    SectionKind::ZeroInit => "zero-init",
                    SectionKind::Initialized => "initialized",
                },
                s.addr,
                s.size,
                s.align
            )?;
        }
        match self.template {
            Some(tm) => writeln!(
                f,
                "  PT_TLS vaddr={:#x} filesz={:#x} memsz={:#x} align={}",
                tm.vaddr, tm.filesz, tm.memsz, tm.align
            )?,
            None => writeln!(f, "  PT_TLS <none>")?,
        }
        write!(f, "  {} TLS symbols", self.symbols.len())
    }
}
