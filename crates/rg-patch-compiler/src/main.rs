//! `rg-patch-compiler`: a small CLI over the patch-collection compiler,
//! an `info` / `compiler-hash` / `compile` subcommand trio parsed with
//! `clap`'s derive API.
//!
//! `compile` needs a concrete [`GraphProvider`] to actually expand any
//! graph-syntax patch, and graph parsing is out of scope for this crate
//! (reached only through that injected trait). This binary wires up
//! [`RawIncludeProvider`], a minimal provider that treats every archive
//! name as a plain file path under `--resource-dir` and never recognizes
//! graph syntax — enough to compile a collection of raw-HLSL-only
//! patches end to end, and a stand-in a host application swaps out for
//! its real graph-syntax provider.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use rg_shader_graph::{DepFileState, GenerateFunctionOptions, GraphProvider, InstantiationRequest, NodeGraphSignature, ParsedGraph, ProviderError};

use rg_patch_compiler::{compile, text, CompileOptions, PatchCompilerError};

#[derive(Parser, Debug)]
#[clap(name = "rg-patch-compiler", about = "Compile shader patch collections", version, author)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the compiler's own version/build information.
    Info,
    /// Print the content hash of a patch-collection text file.
    CompilerHash {
        /// Path to the patch-collection text file.
        patch_collection: PathBuf,
    },
    /// Compile a patch-collection text file and print the resulting HLSL source.
    Compile {
        /// Path to the patch-collection text file.
        patch_collection: PathBuf,
        /// Directory raw (non-graph-syntax) archive names resolve against.
        #[clap(long)]
        resource_dir: PathBuf,
        /// Optional output path; defaults to stdout.
        #[clap(long)]
        out: Option<PathBuf>,
    },
}

/// A minimal [`GraphProvider`] with no graph-syntax support: every
/// archive name is a raw file path under a resource root.
struct RawIncludeProvider {
    resource_dir: PathBuf,
}

impl RawIncludeProvider {
    fn resolve(&self, archive_name: &str) -> PathBuf {
        self.resource_dir.join(archive_name)
    }
}

impl GraphProvider for RawIncludeProvider {
    fn is_graph_syntax(&self, _archive_name: &str) -> bool {
        false
    }

    fn find_graph(&self, archive_name: &str) -> Result<ParsedGraph, ProviderError> {
        Err(ProviderError::GraphNotFound(archive_name.to_string()))
    }

    fn find_signature(&self, _archive_name: &str) -> Result<NodeGraphSignature, ProviderError> {
        Ok(NodeGraphSignature::default())
    }

    fn raw_source_file(&self, archive_name: &str) -> Result<DepFileState, ProviderError> {
        let path = self.resolve(archive_name);
        if !path.exists() {
            return Err(ProviderError::SignatureNotFound(archive_name.to_string()));
        }
        Ok(DepFileState { path: path.to_string_lossy().into_owned() })
    }

    fn generate_function(
        &self,
        _graph: &ParsedGraph,
        _function_name: &str,
        _request: &InstantiationRequest,
        _options: &GenerateFunctionOptions,
    ) -> Result<rg_shader_graph::GenerateFunctionResult, ProviderError> {
        unreachable!("is_graph_syntax always returns false")
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();
    match run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("rg-patch-compiler failed: {err}");
            ExitCode::FAILURE
        }
    }
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("failed to read '{0}': {1}")]
    Read(PathBuf, io::Error),
    #[error(transparent)]
    Text(#[from] text::TextFormatError),
    #[error(transparent)]
    Compile(#[from] PatchCompilerError),
    #[error("failed to write output: {0}")]
    Write(io::Error),
}

fn read_patch_collection(path: &Path) -> Result<String, CliError> {
    fs::read_to_string(path).map_err(|err| CliError::Read(path.to_path_buf(), err))
}

fn run(command: Commands) -> Result<(), CliError> {
    match command {
        Commands::Info => {
            println!("rg-patch-compiler {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Commands::CompilerHash { patch_collection } => {
            let text = read_patch_collection(&patch_collection)?;
            let patches = text::parse(&text)?;
            let collection = rg_patch_compiler::CompiledShaderPatchCollection {
                patches,
                ..rg_patch_compiler::CompiledShaderPatchCollection::default()
            };
            println!("{}", collection.content_hash());
            Ok(())
        }
        Commands::Compile { patch_collection, resource_dir, out } => {
            let text = read_patch_collection(&patch_collection)?;
            let patches = text::parse(&text)?;
            let provider = RawIncludeProvider { resource_dir };
            let compiled = compile(&patches, &provider, &CompileOptions::default())?;
            let source = compiled.source_fragments.join("\n\n");
            match out {
                Some(path) => fs::write(&path, source).map_err(CliError::Write)?,
                None => io::stdout().write_all(source.as_bytes()).map_err(CliError::Write)?,
            }
            Ok(())
        }
    }
}
