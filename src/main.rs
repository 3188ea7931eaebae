/*
Copyright 2025 Connor Nolan

Licensed under the Apache License, Version 2.0 (the "License");
you may not use this file except in compliance with the License.
You may obtain a copy of the License at

    http://www.apache.org/licenses/LICENSE-2.0

Unless required by applicable law or agreed to in writing, software
distributed under the License is distributed on an "AS IS" BASIS,
WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
See the License for the specific language governing permissions and
limitations under the License.
*/

use anyhow::{Context, Result};
use clap::Parser as clap_parser;
use ophis::errors::AssemblyError;
use ophis::file_reader::AsmFileReader;
use ophis::{Options, assemble};
use std::fs;
use std::io::Write;

#[derive(clap_parser)]
#[command(name = "ophis", version, about = "Ophis 6502 cross-assembler")]
struct Opts {
    /// Source files to assemble; "-" reads standard input
    #[arg(required = true)]
    infiles: Vec<String>,

    /// Output file; "-" writes to standard output [default: ophis.bin]
    #[arg(short, long)]
    outfile: Option<String>,

    /// Program listing file
    #[arg(short, long)]
    listfile: Option<String>,

    /// Label map file
    #[arg(short, long)]
    mapfile: Option<String>,

    /// Enable 6510 undocumented opcodes
    #[arg(short, long, conflicts_with_all = ["c02", "c4502"])]
    undoc: bool,

    /// Enable 65c02 extended instruction set
    #[arg(short = 'c', long = "65c02", conflicts_with = "c4502")]
    c02: bool,

    /// Enable 4502 extended instruction set
    #[arg(short = '4', long = "4502")]
    c4502: bool,

    /// Verbose mode
    #[arg(short, long, conflicts_with = "quiet")]
    verbose: bool,

    /// Quiet mode
    #[arg(short, long)]
    quiet: bool,

    /// Raise the debug level (repeatable)
    #[arg(short = 'd', action = clap::ArgAction::Count, hide = true)]
    debug: u8,

    /// Do not print warnings
    #[arg(long = "no-warn", action = clap::ArgAction::SetFalse)]
    warn: bool,

    /// Disable the zero-page collapse pass
    #[arg(long = "no-collapse", action = clap::ArgAction::SetFalse)]
    collapse: bool,

    /// Disable the branch-extension pass
    #[arg(long = "no-branch-extend", action = clap::ArgAction::SetFalse)]
    branch_extend: bool,
}

fn write_text(path: &str, text: &str, what: &str) -> Result<()> {
    if path == "-" {
        print!("{}", text);
        Ok(())
    } else {
        fs::write(path, text).with_context(|| format!("Failed to write {} {}", what, path))
    }
}

fn main() -> Result<()> {
    let opts = Opts::parse();
    let base_verbosity = if opts.quiet {
        0
    } else if opts.verbose {
        2
    } else {
        1
    };
    let options = Options {
        infiles: opts.infiles,
        outfile: opts.outfile,
        listfile: opts.listfile,
        mapfile: opts.mapfile,
        undoc: opts.undoc,
        c02: opts.c02,
        c4502: opts.c4502,
        verbose: base_verbosity + opts.debug,
        warn: opts.warn,
        enable_collapse: opts.collapse,
        enable_branch_extend: opts.branch_extend,
    };

    let reader = AsmFileReader;
    let assembly = match assemble(&options, &reader) {
        Ok(assembly) => assembly,
        // diagnostics and the final count already went to stderr
        Err(AssemblyError::Failed { .. }) => std::process::exit(1),
        Err(e) => return Err(e.into()),
    };

    if assembly.outfile == "-" {
        let stdout = std::io::stdout();
        let mut handle = stdout.lock();
        handle.write_all(&assembly.binary)?;
        handle.flush()?;
    } else {
        fs::write(&assembly.outfile, &assembly.binary)
            .with_context(|| format!("Failed to write output file {}", assembly.outfile))?;
    }

    if let (Some(path), Some(text)) = (&options.listfile, &assembly.listing) {
        write_text(path, text, "listing file")?;
    }
    if let (Some(path), Some(text)) = (&options.mapfile, &assembly.label_map) {
        write_text(path, text, "map file")?;
    }

    Ok(())
}
