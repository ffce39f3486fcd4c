//! Errors reported while inspecting TLS in an ELF image.
use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
#[error("{kind}")]
pub struct InspectError {
    pub kind: InspectErrorKind,
    #[related]
    pub related: Vec<InspectError>,
}

impl InspectError {
    pub fn new(kind: InspectErrorKind) -> Self {
        Self {
            kind,
            related: vec![],
        }
    }

    pub fn new_collect(kind: InspectErrorKind, related: Vec<InspectError>) -> Self {
        Self { kind, related }
    }

    /// Fold a list of failed checks into one error, or Ok if there were none.
    pub fn collect(
        parent_kind: InspectErrorKind,
        errs: Vec<InspectError>,
    ) -> Result<(), InspectError> {
        if errs.is_empty() {
            Ok(())
        } else {
            Err(Self::new_collect(parent_kind, errs))
        }
    }

    /// Kinds of this error and every related one, depth first.
    pub fn kinds(&self) -> Vec<&InspectErrorKind> {
        let mut kinds = vec![&self.kind];
        for r in &self.related {
            kinds.extend(r.kinds());
        }
        kinds
    }
}

impl From<InspectErrorKind> for InspectError {
    fn from(value: InspectErrorKind) -> Self {
        Self::new(value)
    }
}

impl From<elf::ParseError> for InspectError {
    fn from(value: elf::ParseError) -> Self {
        Self::new(InspectErrorKind::Parse { err: value })
    }
}

#[derive(Debug, Error, Diagnostic)]
pub enum InspectErrorKind {
    #[error("failed to read {path}: {err}")]
    Io {
        path: String,
        #[source]
        err: std::io::Error,
    },
    #[error("parse failed: {err}")]
    Parse {
        #[from]
        err: elf::ParseError,
    },
    #[error("no zero-initialized TLS section (.tbss)")]
    #[diagnostic(help("is a zero-initialized thread_local! referenced by the program?"))]
    MissingZeroInit,
    #[error("no initialized TLS section (.tdata)")]
    MissingInitialized,
    #[error("no PT_TLS segment")]
    MissingTemplate,
    #[error("PT_TLS file size {filesz:#x} exceeds memory size {memsz:#x}")]
    TemplateSize { filesz: u64, memsz: u64 },
    #[error("not a position independent executable")]
    #[diagnostic(help("build with -C relocation-model=pie"))]
    NotPie,
    #[error("initialized TLS data does not contain {value:#x}")]
    ConstantNotFound { value: u32 },
    #[error("TLS verification failed for {name}")]
    VerifyFailed { name: String },
}
