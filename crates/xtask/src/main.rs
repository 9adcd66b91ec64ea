//! Workspace developer tasks. Retargeted from the teacher's
//! builtin-function docgen tool to a query-operation reference generator:
//! it scans `pq-common`'s `QueryOperation` enum with `syn` and emits a
//! markdown catalog of every operation and its fields, the same
//! scan-source-emit-docs shape the teacher used for its builtin function
//! reference pages, now pointed at the query operation catalog instead.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};
use syn::{Fields, Item};

#[derive(Parser, Debug)]
#[command(name = "xtask", about = "Workspace developer tasks")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate a markdown reference of every `QueryOperation` variant.
    DocsOps(DocsOpsArgs),
}

#[derive(Parser, Debug)]
struct DocsOpsArgs {
    /// Source file containing the `QueryOperation` enum.
    #[arg(long = "source", default_value = "crates/pq-common/src/query.rs")]
    source: PathBuf,

    /// Output path for the generated markdown. Printed to stdout if omitted.
    #[arg(long = "out")]
    out: Option<PathBuf>,
}

struct OperationDoc {
    name: String,
    doc: String,
    fields: Vec<String>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::DocsOps(args) => docs_ops(&args),
    }
}

fn docs_ops(args: &DocsOpsArgs) -> Result<()> {
    let ops = collect_operations(&args.source, "QueryOperation")?;
    let markdown = render_markdown(&ops);
    match &args.out {
        Some(path) => {
            fs::write(path, markdown).with_context(|| format!("writing {}", path.display()))?;
        }
        None => println!("{markdown}"),
    }
    Ok(())
}

fn collect_operations(source: &Path, enum_name: &str) -> Result<Vec<OperationDoc>> {
    let text = fs::read_to_string(source).with_context(|| format!("reading {}", source.display()))?;
    let file = syn::parse_file(&text).with_context(|| format!("parsing {}", source.display()))?;

    let item_enum = file
        .items
        .into_iter()
        .find_map(|item| match item {
            Item::Enum(e) if e.ident == enum_name => Some(e),
            _ => None,
        })
        .ok_or_else(|| anyhow::anyhow!("enum `{enum_name}` not found in {}", source.display()))?;

    let mut ops = Vec::new();
    for variant in item_enum.variants {
        let doc = doc_comment(&variant.attrs);
        let fields = match &variant.fields {
            Fields::Named(named) => named
                .named
                .iter()
                .map(|f| {
                    let name = f.ident.as_ref().map(|i| i.to_string()).unwrap_or_default();
                    let ty = type_to_string(&f.ty);
                    format!("{name}: {ty}")
                })
                .collect(),
            Fields::Unnamed(unnamed) => unnamed.unnamed.iter().map(|f| type_to_string(&f.ty)).collect(),
            Fields::Unit => Vec::new(),
        };
        ops.push(OperationDoc { name: variant.ident.to_string(), doc, fields });
    }

    if ops.is_empty() {
        bail!("enum `{enum_name}` has no variants");
    }
    Ok(ops)
}

fn doc_comment(attrs: &[syn::Attribute]) -> String {
    let mut lines = Vec::new();
    for attr in attrs {
        if attr.path().is_ident("doc") {
            if let syn::Meta::NameValue(nv) = &attr.meta {
                if let syn::Expr::Lit(expr_lit) = &nv.value {
                    if let syn::Lit::Str(s) = &expr_lit.lit {
                        lines.push(s.value().trim().to_string());
                    }
                }
            }
        }
    }
    lines.join(" ")
}

fn type_to_string(ty: &syn::Type) -> String {
    quote_type(ty)
}

fn quote_type(ty: &syn::Type) -> String {
    use quote::ToTokens;
    ty.to_token_stream().to_string().replace(" < ", "<").replace(" > ", ">").replace(" >", ">")
}

fn render_markdown(ops: &[OperationDoc]) -> String {
    let mut out = String::from("# Query operation reference\n\nGenerated by `xtask docs-ops`. Do not edit by hand.\n\n");
    for op in ops {
        out.push_str(&format!("## `{}`\n\n", op.name));
        if !op.doc.is_empty() {
            out.push_str(&op.doc);
            out.push_str("\n\n");
        }
        if op.fields.is_empty() {
            out.push_str("No fields.\n\n");
        } else {
            out.push_str("Fields:\n\n");
            for field in &op.fields {
                out.push_str(&format!("- `{field}`\n"));
            }
            out.push('\n');
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_a_variant_with_named_fields_and_a_doc_comment() {
        let ops = vec![OperationDoc {
            name: "Take".to_string(),
            doc: "Keeps the first `n` rows.".to_string(),
            fields: vec!["n: usize".to_string()],
        }];
        let markdown = render_markdown(&ops);
        assert!(markdown.contains("## `Take`"));
        assert!(markdown.contains("Keeps the first `n` rows."));
        assert!(markdown.contains("- `n: usize`"));
    }

    #[test]
    fn collects_every_variant_from_a_small_enum_source() {
        let dir = tempfile_dir();
        let path = dir.join("ops.rs");
        fs::write(
            &path,
            r#"
            pub enum QueryOperation {
                /// Keeps the first n rows.
                Take { n: usize },
                RemoveColumns { columns: Vec<String> },
                DistinctRows,
            }
            "#,
        )
        .unwrap();

        let ops = collect_operations(&path, "QueryOperation").unwrap();
        assert_eq!(ops.len(), 3);
        assert_eq!(ops[0].name, "Take");
        assert_eq!(ops[0].doc, "Keeps the first n rows.");
        assert_eq!(ops[1].fields, vec!["columns: Vec<String>"]);
        assert!(ops[2].fields.is_empty());

        fs::remove_dir_all(dir).unwrap();
    }

    fn tempfile_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("xtask-docs-ops-test-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        dir
    }
}
