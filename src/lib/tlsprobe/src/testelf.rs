//! Minimal little-endian ELF64 images for exercising the inspector.
//!
//! The TLS template is always written right after the program headers: four bytes of initialized
//! data followed by four bytes standing in for `.tbss`. Everything else is optional.

use elf::abi::{
    DF_1_PIE, DT_FLAGS_1, DT_NULL, EM_X86_64, ET_DYN, PT_TLS, SHF_ALLOC, SHF_TLS, SHF_WRITE,
    SHT_DYNAMIC, SHT_NOBITS, SHT_PROGBITS, SHT_STRTAB, SHT_SYMTAB, STB_GLOBAL, STT_TLS,
};

const EHDR_SIZE: usize = 64;
const PHDR_SIZE: usize = 56;
const SHDR_SIZE: usize = 64;
const SYM_SIZE: u64 = 24;
const DYN_SIZE: u64 = 16;

/// Virtual address of the TLS template.
pub const TLS_VADDR: u64 = 0x1000;

pub struct TestElf {
    pub machine: u16,
    pub tbss: bool,
    pub tdata: bool,
    pub pt_tls: bool,
    pub tdata_value: u32,
    pub template_memsz: u64,
    /// Add a `.dynamic` section with `DF_1_PIE` in `DT_FLAGS_1`.
    pub pie: bool,
    /// Add a `.symtab` with `TDATA_ENTRY` at template offset 0 and `TBSS_ENTRY` at offset 4.
    pub symbols: bool,
    /// Without this the image has no section header table at all.
    pub section_headers: bool,
    pub tdata_name: &'static [u8],
}

impl Default for TestElf {
    fn default() -> Self {
        Self {
            machine: EM_X86_64,
            tbss: true,
            tdata: true,
            pt_tls: true,
            tdata_value: 0xdeadbeef,
            template_memsz: 8,
            pie: false,
            symbols: false,
            section_headers: true,
            tdata_name: b".tdata",
        }
    }
}

#[derive(Default)]
struct Shdr {
    name: u32,
    typ: u32,
    flags: u64,
    addr: u64,
    offset: u64,
    size: u64,
    link: u32,
    info: u32,
    align: u64,
    entsize: u64,
}

fn add_name(strtab: &mut Vec<u8>, name: &[u8]) -> u32 {
    let idx = strtab.len() as u32;
    strtab.extend_from_slice(name);
    strtab.push(0);
    idx
}

impl TestElf {
    pub fn build(&self) -> Vec<u8> {
        let phnum = usize::from(self.pt_tls);
        let tls_off = EHDR_SIZE + phnum * PHDR_SIZE;
        let tls_flags = (SHF_ALLOC | SHF_WRITE | SHF_TLS) as u64;

        // File contents after the program headers, starting at tls_off.
        let mut body = Vec::new();
        body.extend_from_slice(&self.tdata_value.to_le_bytes());
        body.extend_from_slice(&[0; 4]);
        let place = |body: &mut Vec<u8>, data: &[u8]| -> u64 {
            body.resize((body.len() + 7) & !7, 0);
            let off = (tls_off + body.len()) as u64;
            body.extend_from_slice(data);
            off
        };

        let mut shstrtab = vec![0];
        let mut shdrs = vec![Shdr::default()];
        let mut tdata_idx = 0;
        let mut tbss_idx = 0;
        if self.tdata {
            tdata_idx = shdrs.len() as u16;
            shdrs.push(Shdr {
                name: add_name(&mut shstrtab, self.tdata_name),
                typ: SHT_PROGBITS,
                flags: tls_flags,
                addr: TLS_VADDR,
                offset: tls_off as u64,
                size: 4,
                align: 4,
                ..Default::default()
            });
        }
        if self.tbss {
            tbss_idx = shdrs.len() as u16;
            shdrs.push(Shdr {
                name: add_name(&mut shstrtab, b".tbss"),
                typ: SHT_NOBITS,
                flags: tls_flags,
                addr: TLS_VADDR + 4,
                offset: tls_off as u64 + 4,
                size: 4,
                align: 4,
                ..Default::default()
            });
        }
        if self.pie {
            let mut dynamic = Vec::new();
            for (tag, val) in [(DT_FLAGS_1 as i64, DF_1_PIE as u64), (DT_NULL as i64, 0)] {
                dynamic.extend_from_slice(&tag.to_le_bytes());
                dynamic.extend_from_slice(&val.to_le_bytes());
            }
            shdrs.push(Shdr {
                name: add_name(&mut shstrtab, b".dynamic"),
                typ: SHT_DYNAMIC,
                flags: (SHF_ALLOC | SHF_WRITE) as u64,
                offset: place(&mut body, &dynamic),
                size: dynamic.len() as u64,
                align: 8,
                entsize: DYN_SIZE,
                ..Default::default()
            });
        }
        if self.symbols {
            let mut strtab = vec![0];
            let mut symtab = vec![0; SYM_SIZE as usize];
            for (name, shndx, value) in [
                (&b"TDATA_ENTRY"[..], tdata_idx, 0u64),
                (&b"TBSS_ENTRY"[..], tbss_idx, 4u64),
            ] {
                symtab.extend_from_slice(&add_name(&mut strtab, name).to_le_bytes());
                symtab.push(((STB_GLOBAL as u8) << 4) | STT_TLS as u8);
                symtab.push(0);
                symtab.extend_from_slice(&shndx.to_le_bytes());
                symtab.extend_from_slice(&value.to_le_bytes());
                symtab.extend_from_slice(&4u64.to_le_bytes());
            }
            let strtab_idx = shdrs.len() as u32;
            shdrs.push(Shdr {
                name: add_name(&mut shstrtab, b".strtab"),
                typ: SHT_STRTAB,
                offset: place(&mut body, &strtab),
                size: strtab.len() as u64,
                align: 1,
                ..Default::default()
            });
            shdrs.push(Shdr {
                name: add_name(&mut shstrtab, b".symtab"),
                typ: SHT_SYMTAB,
                offset: place(&mut body, &symtab),
                size: symtab.len() as u64,
                link: strtab_idx,
                info: 1,
                align: 8,
                entsize: SYM_SIZE,
                ..Default::default()
            });
        }
        let shstrtab_name = add_name(&mut shstrtab, b".shstrtab");
        shdrs.push(Shdr {
            name: shstrtab_name,
            typ: SHT_STRTAB,
            offset: place(&mut body, &shstrtab),
            size: shstrtab.len() as u64,
            align: 1,
            ..Default::default()
        });
        body.resize((body.len() + 7) & !7, 0);

        let (shoff, shnum, shstrndx) = if self.section_headers {
            (tls_off + body.len(), shdrs.len(), shdrs.len() - 1)
        } else {
            (0, 0, 0)
        };

        let mut out = Vec::new();
        out.extend_from_slice(&[0x7f, b'E', b'L', b'F', 2, 1, 1, 0]);
        out.extend_from_slice(&[0; 8]);
        out.extend_from_slice(&(ET_DYN as u16).to_le_bytes());
        out.extend_from_slice(&self.machine.to_le_bytes());
        out.extend_from_slice(&1u32.to_le_bytes());
        out.extend_from_slice(&0u64.to_le_bytes());
        out.extend_from_slice(&(if phnum > 0 { EHDR_SIZE as u64 } else { 0 }).to_le_bytes());
        out.extend_from_slice(&(shoff as u64).to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes());
        out.extend_from_slice(&(EHDR_SIZE as u16).to_le_bytes());
        out.extend_from_slice(&(PHDR_SIZE as u16).to_le_bytes());
        out.extend_from_slice(&(phnum as u16).to_le_bytes());
        out.extend_from_slice(&(SHDR_SIZE as u16).to_le_bytes());
        out.extend_from_slice(&(shnum as u16).to_le_bytes());
        out.extend_from_slice(&(shstrndx as u16).to_le_bytes());
        assert_eq!(out.len(), EHDR_SIZE);

        if self.pt_tls {
            out.extend_from_slice(&(PT_TLS as u32).to_le_bytes());
            // PF_R
            out.extend_from_slice(&4u32.to_le_bytes());
            out.extend_from_slice(&(tls_off as u64).to_le_bytes());
            out.extend_from_slice(&TLS_VADDR.to_le_bytes());
            out.extend_from_slice(&TLS_VADDR.to_le_bytes());
            out.extend_from_slice(&4u64.to_le_bytes());
            out.extend_from_slice(&self.template_memsz.to_le_bytes());
            out.extend_from_slice(&4u64.to_le_bytes());
        }

        out.extend_from_slice(&body);
        if !self.section_headers {
            return out;
        }
        for sh in &shdrs {
            out.extend_from_slice(&sh.name.to_le_bytes());
            out.extend_from_slice(&sh.typ.to_le_bytes());
            out.extend_from_slice(&sh.flags.to_le_bytes());
            out.extend_from_slice(&sh.addr.to_le_bytes());
            out.extend_from_slice(&sh.offset.to_le_bytes());
            out.extend_from_slice(&sh.size.to_le_bytes());
            out.extend_from_slice(&sh.link.to_le_bytes());
            out.extend_from_slice(&sh.info.to_le_bytes());
            out.extend_from_slice(&sh.align.to_le_bytes());
            out.extend_from_slice(&sh.entsize.to_le_bytes());
        }
        out
    }
}
