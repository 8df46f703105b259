//! Declared functions and comment blocks read from Rust source.
//!
//! This is the scanner side of the resolver: it only reports what is
//! declared, it never classifies anything.

use std::path::{Path, PathBuf};

use quote::ToTokens;
use serde::Serialize;
use syn::{Attribute, AttrStyle, Expr, ExprLit, FnArg, Item, Lit, Meta, ReturnType, Type};
use thiserror::Error;
use walkdir::WalkDir;

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("failed to read `{}`: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse `{module}`: {source}")]
    Parse {
        module: String,
        #[source]
        source: syn::Error,
    },

    #[error(transparent)]
    Walk(#[from] walkdir::Error),
}

/// Parameter and result types, rendered as source text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Signature {
    pub params: Vec<String>,
    pub results: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeclaredFunction {
    pub qualified_name: String,
    pub name: String,
    pub signature: Signature,
    #[serde(skip)]
    pub doc_comment: String,
}

/// Everything scanned from one package: its functions in declaration order
/// and every comment block that may hold file-scope directives.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceUnit {
    pub package: String,
    pub functions: Vec<DeclaredFunction>,
    pub comments: Vec<String>,
}

impl SourceUnit {
    pub fn new(package: impl Into<String>) -> Self {
        SourceUnit {
            package: package.into(),
            ..SourceUnit::default()
        }
    }

    pub fn merge(&mut self, other: SourceUnit) {
        self.functions.extend(other.functions);
        self.comments.extend(other.comments);
    }
}

// ============================================================================
// Scanning
// ============================================================================

/// Scan one Rust source file. Functions are qualified with `module`.
pub fn scan_source(module: &str, text: &str) -> Result<SourceUnit, ScanError> {
    let file = syn::parse_file(text).map_err(|source| ScanError::Parse {
        module: module.to_string(),
        source,
    })?;

    let mut unit = SourceUnit::new(module);
    push_comment(&mut unit.comments, doc_text(&file.attrs, true));
    scan_items(&mut unit, module, &file.items);
    Ok(unit)
}

/// Scan every file directly inside `dir` whose name ends with `suffix`,
/// in file-name order. The package is named after the directory.
pub fn scan_dir(dir: &Path, suffix: &str) -> Result<SourceUnit, ScanError> {
    let package = dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mut unit = SourceUnit::new(package);

    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = entry?;
        let file_name = entry.file_name().to_string_lossy();
        if !entry.file_type().is_file() || !file_name.ends_with(suffix) {
            continue;
        }

        let path = entry.path();
        let text = std::fs::read_to_string(path).map_err(|source| ScanError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let module = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();

        tracing::debug!(file = %path.display(), "scanning source file");
        unit.merge(scan_source(&module, &text)?);
    }

    Ok(unit)
}

fn scan_items(unit: &mut SourceUnit, module: &str, items: &[Item]) {
    for item in items {
        match item {
            Item::Fn(func) => {
                let name = func.sig.ident.to_string();
                let doc_comment = doc_text(&func.attrs, false);
                push_comment(&mut unit.comments, doc_comment.clone());
                unit.functions.push(DeclaredFunction {
                    qualified_name: format!("{module}::{name}"),
                    name,
                    signature: signature(&func.sig),
                    doc_comment,
                });
            }
            Item::Mod(module_item) => {
                let Some((_, content)) = &module_item.content else {
                    continue;
                };
                let nested = format!("{module}::{}", module_item.ident);
                push_comment(
                    &mut unit.comments,
                    doc_text(&module_item.attrs, true),
                );
                scan_items(unit, &nested, content);
            }
            _ => {}
        }
    }
}

fn push_comment(comments: &mut Vec<String>, comment: String) {
    if !comment.trim().is_empty() {
        comments.push(comment);
    }
}

fn signature(sig: &syn::Signature) -> Signature {
    let params = sig
        .inputs
        .iter()
        .filter_map(|arg| match arg {
            FnArg::Typed(pat) => Some(render(&pat.ty)),
            FnArg::Receiver(_) => None,
        })
        .collect();

    let results = match &sig.output {
        ReturnType::Default => Vec::new(),
        ReturnType::Type(_, ty) => match ty.as_ref() {
            Type::Tuple(tuple) => tuple.elems.iter().map(render).collect(),
            other => vec![render(other)],
        },
    };

    Signature { params, results }
}

fn render(ty: &Type) -> String {
    ty.to_token_stream().to_string()
}

/// Join the inner (`//!`) or outer (`///`) doc attributes into comment text.
fn doc_text(attrs: &[Attribute], inner: bool) -> String {
    attrs
        .iter()
        .filter(|attr| matches!(attr.style, AttrStyle::Inner(_)) == inner)
        .filter(|attr| attr.path().is_ident("doc"))
        .filter_map(|attr| match &attr.meta {
            Meta::NameValue(nv) => match &nv.value {
                Expr::Lit(ExprLit {
                    lit: Lit::Str(text), ..
                }) => Some(text.value()),
                _ => None,
            },
            _ => None,
        })
        .flat_map(|text| {
            text.lines()
                .map(|line| line.strip_prefix(' ').unwrap_or(line).to_string())
                .collect::<Vec<_>>()
        })
        .collect::<Vec<_>>()
        .join("\n")
}
