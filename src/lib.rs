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

//! Ophis, a cross-assembler for the MOS 6502 family (base 6502, 6510
//! undocumented opcodes, 65C02 and CSG 4502 extensions). Sources in the
//! Ophis dialect are parsed into an IR tree, a pipeline of passes runs
//! over the tree until instruction widths and label values converge, and
//! the result is a flat binary image plus optional listing and label-map
//! text.

pub mod environment;
pub mod errors;
pub mod expr;
pub mod file_reader;
pub mod ir;
pub mod lexer;
pub mod listing;
pub mod macros;
pub mod opcodes;
pub mod parser;
pub mod passes;

use errors::{AssemblyError, ErrorLog};
use file_reader::FileReader;
use ir::Node;
use opcodes::OpcodeTable;
use parser::Parser;
use passes::{Assembler, Context, Stage};

/// Everything configurable about one assembly run.
#[derive(Debug, Clone)]
pub struct Options {
    /// Source files in concatenation order; "-" denotes standard input.
    pub infiles: Vec<String>,
    /// Explicit output path; beats any `.outfile` request in the source.
    pub outfile: Option<String>,
    pub listfile: Option<String>,
    pub mapfile: Option<String>,
    /// 6510 undocumented opcodes.
    pub undoc: bool,
    /// 65c02 extensions.
    pub c02: bool,
    /// CSG 4502 extensions.
    pub c4502: bool,
    /// 0 silent .. 5 dump everything; 1 is the default summary level.
    pub verbose: u8,
    pub warn: bool,
    pub enable_collapse: bool,
    pub enable_branch_extend: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            infiles: Vec::new(),
            outfile: None,
            listfile: None,
            mapfile: None,
            undoc: false,
            c02: false,
            c4502: false,
            verbose: 1,
            warn: true,
            enable_collapse: true,
            enable_branch_extend: true,
        }
    }
}

/// The product of a successful assembly.
pub struct Assembly {
    pub binary: Vec<u8>,
    pub code: usize,
    pub data: usize,
    pub filler: usize,
    /// Rendered listing text, when a listing file was requested.
    pub listing: Option<String>,
    /// Rendered label map, when a map file was requested.
    pub label_map: Option<String>,
    /// Where the binary should land: the explicit output option, else
    /// the source's `.outfile` request, else `ophis.bin`.
    pub outfile: String,
}

/// Assembles the configured sources. Diagnostics stream to stderr as
/// they are found; when any were reported the binary is withheld and the
/// error count (plus the collected diagnostics) comes back instead.
pub fn assemble<F: FileReader>(options: &Options, reader: &F) -> Result<Assembly, AssemblyError> {
    if options.infiles.is_empty() {
        return Err(AssemblyError::NoInput);
    }
    let opcodes = OpcodeTable::build(options.undoc, options.c02, options.c4502);
    let mut errors = ErrorLog::new(options.warn);

    let mut parser = Parser::new(reader, &opcodes, options);
    let mut roots = Vec::new();
    for infile in &options.infiles {
        roots.push(parser.parse_file("<Top Level>", infile, &mut errors));
    }
    let mut root = Node::sequence("<Top Level>", roots);
    let requested_outfile = parser.requested_outfile().map(str::to_string);

    let mut ctx = Context::new(&opcodes, options, errors);
    for stage in &mut passes::pipeline() {
        stage.go(&mut root, &mut ctx);
    }
    let mut assembler = Assembler::new(options.listfile.is_some(), options.mapfile.is_some());
    Stage::go(&mut assembler, &mut root, &mut ctx);

    let count = ctx.errors.count();
    if count > 0 || options.verbose >= 1 {
        eprintln!("{}", ctx.errors.report());
    }
    if count > 0 {
        return Err(AssemblyError::Failed {
            count,
            diagnostics: ctx.errors.into_diagnostics(),
        });
    }

    Ok(Assembly {
        binary: assembler.output,
        code: assembler.code,
        data: assembler.data,
        filler: assembler.filler,
        listing: assembler.listing.map(|l| l.render(reader)),
        label_map: assembler.label_map.map(|m| m.render()),
        outfile: options
            .outfile
            .clone()
            .or(requested_outfile)
            .unwrap_or_else(|| "ophis.bin".to_string()),
    })
}
