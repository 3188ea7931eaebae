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

use ophis::errors::{AssemblyError, Diagnostic};
use ophis::file_reader::MockFileReader;
use ophis::{Options, assemble};

fn quiet_options() -> Options {
    Options {
        infiles: vec!["test.oph".to_string()],
        verbose: 0,
        ..Options::default()
    }
}

fn assemble_with(source: &str, options: Options) -> Vec<u8> {
    let mut reader = MockFileReader::default();
    reader.add_file("test.oph", source);
    assemble(&options, &reader).expect("assembly failed").binary
}

fn assemble_source(source: &str) -> Vec<u8> {
    assemble_with(source, quiet_options())
}

fn assemble_failure(source: &str, options: Options) -> (usize, Vec<Diagnostic>) {
    let mut reader = MockFileReader::default();
    reader.add_file("test.oph", source);
    match assemble(&options, &reader) {
        Err(AssemblyError::Failed { count, diagnostics }) => (count, diagnostics),
        Err(other) => panic!("expected soft failure, got {:?}", other),
        Ok(_) => panic!("expected assembly to fail"),
    }
}

fn has_message(diagnostics: &[Diagnostic], fragment: &str) -> bool {
    diagnostics.iter().any(|d| d.message.contains(fragment))
}

#[test]
fn test_byte_string() {
    assert_eq!(
        assemble_source(".byte \"Hello, world!\"\n"),
        b"Hello, world!".to_vec()
    );
}

#[test]
fn test_immediate_pc_reference() {
    assert_eq!(assemble_source(".org $41\nlda #^\n"), vec![0xA9, 0x41]);
}

#[test]
fn test_anonymous_labels() {
    assert_eq!(
        assemble_source(".org $fa\nlda +\nlda ^\n* rts\n"),
        vec![0xA5, 0xFE, 0xA5, 0xFC, 0x60]
    );
}

#[test]
fn test_branch_reversal_moves_code() {
    // bne cannot reach; it reverses into beq over a jmp, which pushes
    // the lda past the zero page
    assert_eq!(
        assemble_source(".org $fb\nbne ^+200\nlda ^\n"),
        vec![0xF0, 0x03, 0x4C, 0xC5, 0x01, 0xAD, 0x00, 0x01]
    );
}

#[test]
fn test_scoped_labels_do_not_collide() {
    let source = ".org $41\n.scope\n_l: .byte _l\n.scend\n.scope\n_l: .byte _l\n.scend\n";
    assert_eq!(assemble_source(source), vec![0x41, 0x42]);
}

#[test]
fn test_macro_definition_and_invocation() {
    let source = ".macro greet\n.byte \"hi\",_1\n.macend\n`greet 'A\n.invoke greet 'B\n";
    assert_eq!(
        assemble_source(source),
        vec![0x68, 0x69, 0x41, 0x68, 0x69, 0x42]
    );
}

#[test]
fn test_macro_labels_are_fresh_per_invocation() {
    let source = ".macro wait\n_loop: dex\nbne _loop\n.macend\n`wait\n`wait\n";
    assert_eq!(
        assemble_source(source),
        vec![0xCA, 0xD0, 0xFD, 0xCA, 0xD0, 0xFD]
    );
}

#[test]
fn test_zero_page_selection() {
    assert_eq!(assemble_source("lda $10\n"), vec![0xA5, 0x10]);
    assert_eq!(assemble_source("lda $0200\n"), vec![0xAD, 0x00, 0x02]);
    assert_eq!(assemble_source("lda $10,x\n"), vec![0xB5, 0x10]);
    assert_eq!(assemble_source("ldx $10,y\n"), vec![0xB6, 0x10]);
    assert_eq!(assemble_source("sta $1234,x\n"), vec![0x9D, 0x34, 0x12]);
}

#[test]
fn test_pointer_modes() {
    assert_eq!(assemble_source("lda ($10,x)\n"), vec![0xA1, 0x10]);
    assert_eq!(assemble_source("sta ($10),y\n"), vec![0x91, 0x10]);
    assert_eq!(assemble_source("jmp ($1234)\n"), vec![0x6C, 0x34, 0x12]);
}

#[test]
fn test_expression_precedence() {
    assert_eq!(assemble_source(".byte 2+3*4\n"), vec![14]);
    assert_eq!(assemble_source(".byte [2+3]*4\n"), vec![20]);
    // the bit operators share the loosest level, left to right
    assert_eq!(assemble_source(".byte 1|2&3\n"), vec![3]);
}

#[test]
fn test_byte_selectors() {
    assert_eq!(assemble_source("lda #<$1234\n"), vec![0xA9, 0x34]);
    assert_eq!(assemble_source("lda #>$1234\n"), vec![0xA9, 0x12]);
}

#[test]
fn test_data_pragma_endianness() {
    assert_eq!(assemble_source(".word $1234\n"), vec![0x34, 0x12]);
    assert_eq!(assemble_source(".wordbe $1234\n"), vec![0x12, 0x34]);
    assert_eq!(
        assemble_source(".dword $12345678\n"),
        vec![0x78, 0x56, 0x34, 0x12]
    );
    assert_eq!(
        assemble_source(".dwordbe $12345678\n"),
        vec![0x12, 0x34, 0x56, 0x78]
    );
}

#[test]
fn test_legacy_pragma_aliases() {
    assert_eq!(assemble_source(".ascii \"Hi\"\n"), vec![0x48, 0x69]);
    assert_eq!(assemble_source(".address $1234\n"), vec![0x34, 0x12]);
}

#[test]
fn test_advance_emits_filler() {
    assert_eq!(
        assemble_source(".byte 1\n.advance 4, $ff\n.byte 2\n"),
        vec![0x01, 0xFF, 0xFF, 0xFF, 0x02]
    );
}

#[test]
fn test_advance_backwards_is_an_error() {
    let (_, diagnostics) = assemble_failure(".byte 1,2,3,4\n.advance 2\n", quiet_options());
    assert!(has_message(&diagnostics, ".advance backwards"));
}

#[test]
fn test_checkpc() {
    assert_eq!(assemble_source(".org $10\n.checkpc $20\nrts\n"), vec![0x60]);
    let (_, diagnostics) = assemble_failure(".org $10\n.checkpc $0f\n", quiet_options());
    assert!(has_message(&diagnostics, ".checkpc assertion failed"));
}

#[test]
fn test_data_segment_rejects_output() {
    let (_, diagnostics) = assemble_failure(".data\n.byte 1\n", quiet_options());
    assert!(has_message(&diagnostics, "Attempt to write to data segment"));
}

#[test]
fn test_space_reserves_addresses_in_data_segment() {
    let source = ".data\n.org $200\n.space foo 4\n.space bar 2\n.text\nlda foo\nlda bar\n";
    assert_eq!(
        assemble_source(source),
        vec![0xAD, 0x00, 0x02, 0xAD, 0x04, 0x02]
    );
}

#[test]
fn test_segments_keep_separate_counters() {
    let source = "\
.data\n.org $10\n.space v1 1\n.text\n.org $80\nstart: lda v1\n.data\n.space v2 1\n.text\nlda v2\n";
    // v1=$10, v2=$11; both zero page
    assert_eq!(
        assemble_source(source),
        vec![0xA5, 0x10, 0xA5, 0x11]
    );
}

#[test]
fn test_include_and_require() {
    let mut reader = MockFileReader::default();
    reader.add_file("test.oph", ".include \"inc.oph\"\n.include \"inc.oph\"\n");
    reader.add_file("inc.oph", ".byte 1\n");
    let binary = assemble(&quiet_options(), &reader).unwrap().binary;
    assert_eq!(binary, vec![1, 1]);

    let mut reader = MockFileReader::default();
    reader.add_file("test.oph", ".require \"inc.oph\"\n.require \"inc.oph\"\n");
    reader.add_file("inc.oph", ".byte 1\n");
    let binary = assemble(&quiet_options(), &reader).unwrap().binary;
    assert_eq!(binary, vec![1]);
}

#[test]
fn test_recursive_include_is_an_error() {
    let mut reader = MockFileReader::default();
    reader.add_file("test.oph", ".include \"test.oph\"\n");
    match assemble(&quiet_options(), &reader) {
        Err(AssemblyError::Failed { diagnostics, .. }) => {
            assert!(has_message(&diagnostics, "Recursive include"));
        }
        other => panic!("expected failure, got {:?}", other.is_ok()),
    }
}

#[test]
fn test_incbin_with_offset_and_length() {
    let mut reader = MockFileReader::default();
    reader.add_binary_file("data.bin", &[1, 2, 3, 4, 5, 6]);

    reader.add_file("test.oph", ".incbin \"data.bin\"\n");
    assert_eq!(
        assemble(&quiet_options(), &reader).unwrap().binary,
        vec![1, 2, 3, 4, 5, 6]
    );

    reader.add_file("test.oph", ".incbin \"data.bin\", 2\n");
    assert_eq!(
        assemble(&quiet_options(), &reader).unwrap().binary,
        vec![3, 4, 5, 6]
    );

    reader.add_file("test.oph", ".incbin \"data.bin\", 2, 3\n");
    assert_eq!(
        assemble(&quiet_options(), &reader).unwrap().binary,
        vec![3, 4, 5]
    );

    reader.add_file("test.oph", ".incbin \"data.bin\", 5, 9\n");
    assert!(assemble(&quiet_options(), &reader).is_err());
}

#[test]
fn test_charmap_translation() {
    assert_eq!(
        assemble_source(".charmap 'A, 'a\n.byte \"AB\"\n"),
        vec![0x61, 0x42]
    );
    // reset restores the identity map
    assert_eq!(
        assemble_source(".charmap 'A, 'a\n.charmap\n.byte \"AB\"\n"),
        vec![0x41, 0x42]
    );
}

#[test]
fn test_charmapbin_must_be_256_bytes() {
    let mut reader = MockFileReader::default();
    reader.add_binary_file("map.bin", &[0, 1, 2]);
    reader.add_file("test.oph", ".charmapbin \"map.bin\"\n");
    match assemble(&quiet_options(), &reader) {
        Err(AssemblyError::Failed { diagnostics, .. }) => {
            assert!(has_message(&diagnostics, "not 256 bytes long"));
        }
        other => panic!("expected failure, got {:?}", other.is_ok()),
    }
}

#[test]
fn test_alias() {
    assert_eq!(
        assemble_source(".alias start $c000\njmp start\n"),
        vec![0x4C, 0x00, 0xC0]
    );
}

#[test]
fn test_extension_gating() {
    // phx is not a mnemonic under the base instruction set
    let (_, diagnostics) = assemble_failure("phx\n", quiet_options());
    assert!(has_message(&diagnostics, "Expected:"));

    let c02 = Options {
        c02: true,
        ..quiet_options()
    };
    assert_eq!(assemble_with("phx\n", c02), vec![0xDA]);
}

#[test]
fn test_c02_zero_page_indirect() {
    let (_, diagnostics) = assemble_failure("lda ($10)\n", quiet_options());
    assert!(has_message(&diagnostics, "does not have mode"));

    let c02 = Options {
        c02: true,
        ..quiet_options()
    };
    assert_eq!(assemble_with("lda ($10)\n", c02), vec![0xB2, 0x10]);
}

#[test]
fn test_undocumented_opcodes() {
    let undoc = Options {
        undoc: true,
        ..quiet_options()
    };
    assert_eq!(assemble_with("lax $10\n", undoc), vec![0xA7, 0x10]);
}

#[test]
fn test_branch_offsets_in_range() {
    // backward branch to its own address: -2 from the following byte
    assert_eq!(assemble_source("* beq -\n"), vec![0xF0, 0xFE]);
    // forward branch to the next instruction: offset 0
    assert_eq!(assemble_source("beq +\n* rts\n"), vec![0xF0, 0x00, 0x60]);
}

#[test]
fn test_branch_extension_disabled_is_an_error() {
    let options = Options {
        enable_branch_extend: false,
        ..quiet_options()
    };
    let (_, diagnostics) = assemble_failure(".org $1000\nbne $2000\n", options);
    assert!(has_message(&diagnostics, "Branch target out of bounds"));
}

#[test]
fn test_no_collapse_keeps_absolute() {
    let options = Options {
        enable_collapse: false,
        ..quiet_options()
    };
    assert_eq!(assemble_with("lda $10\n", options), vec![0xAD, 0x10, 0x00]);
}

#[test]
fn test_4502_long_branch() {
    let options = Options {
        c4502: true,
        ..quiet_options()
    };
    // bne $2000 from $1000: 16-bit relative, offset $2000 - $1002 = $0ffe
    assert_eq!(
        assemble_with(".org $1000\nbne $2000\n", options),
        vec![0xD3, 0xFE, 0x0F]
    );
}

#[test]
fn test_4502_bsr_and_phw() {
    let options = Options {
        c4502: true,
        ..quiet_options()
    };
    assert_eq!(
        assemble_with("bsr ^+3\n", options.clone()),
        vec![0x63, 0x01, 0x00]
    );
    assert_eq!(
        assemble_with("phw #$1234\n", options.clone()),
        vec![0xF4, 0x34, 0x12]
    );
    assert_eq!(assemble_with("phw $1234\n", options), vec![0xFC, 0x34, 0x12]);
}

#[test]
fn test_4502_stack_relative_and_indirect_z() {
    let options = Options {
        c4502: true,
        ..quiet_options()
    };
    assert_eq!(
        assemble_with("lda ($10,sp),y\n", options.clone()),
        vec![0xE2, 0x10]
    );
    assert_eq!(assemble_with("lda ($10),z\n", options), vec![0xB2, 0x10]);
}

#[test]
fn test_zp_relative_branch() {
    let c02 = Options {
        c02: true,
        ..quiet_options()
    };
    assert_eq!(
        assemble_with("bbr0 $10, ^+5\n", c02.clone()),
        vec![0x0F, 0x10, 0x02]
    );
    // out of range: reversed over a jmp
    assert_eq!(
        assemble_with(".org $1000\nbbr0 $10, $2000\n", c02),
        vec![0x8F, 0x10, 0x03, 0x4C, 0x00, 0x20]
    );
}

#[test]
fn test_duplicate_label_is_an_error() {
    let (_, diagnostics) = assemble_failure("a: .byte 1\na: .byte 2\n", quiet_options());
    assert!(has_message(&diagnostics, "Duplicate label definition 'a'"));
}

#[test]
fn test_unknown_pragma_is_an_error() {
    let (_, diagnostics) = assemble_failure(".frobnicate\n", quiet_options());
    assert!(has_message(&diagnostics, "Unknown pragma frobnicate"));
}

#[test]
fn test_circular_alias_is_an_error() {
    let (_, diagnostics) = assemble_failure(".alias a b\n.alias b a\n", quiet_options());
    assert!(has_message(&diagnostics, "Undefined or circular"));
}

#[test]
fn test_circular_org_is_an_error() {
    let (_, diagnostics) = assemble_failure(".org end\n.byte 1\nend: .byte 2\n", quiet_options());
    assert!(has_message(&diagnostics, "program counter set"));
}

#[test]
fn test_nested_macro_definition_is_an_error() {
    let source = ".macro outer\n.macro inner\n.macend\n.macend\n";
    let (_, diagnostics) = assemble_failure(source, quiet_options());
    assert!(has_message(&diagnostics, "Nested macro definition"));
}

#[test]
fn test_unmatched_macend_is_an_error() {
    let (_, diagnostics) = assemble_failure(".macend\n", quiet_options());
    assert!(has_message(&diagnostics, "Unmatched .macend"));
}

#[test]
fn test_undefined_macro_is_an_error() {
    let (_, diagnostics) = assemble_failure("`nothing\n", quiet_options());
    assert!(has_message(&diagnostics, "Undefined macro 'nothing'"));
}

#[test]
fn test_unmatched_scend_is_an_error() {
    let (_, diagnostics) = assemble_failure(".scend\n", quiet_options());
    assert!(has_message(&diagnostics, "Unmatched .scend"));
}

#[test]
fn test_byte_out_of_range_is_an_error() {
    let (_, diagnostics) = assemble_failure(".byte 300\n", quiet_options());
    assert!(has_message(&diagnostics, "out of range"));
}

#[test]
fn test_determinism() {
    let source = ".org $fb\nbne ^+200\nlda ^\nloop: dex\nbne loop\n.byte \"done\"\n";
    assert_eq!(assemble_source(source), assemble_source(source));
}

#[test]
fn test_multiple_input_files_concatenate() {
    let mut reader = MockFileReader::default();
    reader.add_file("a.oph", ".byte 1\n");
    reader.add_file("b.oph", ".byte 2\n");
    let options = Options {
        infiles: vec!["a.oph".to_string(), "b.oph".to_string()],
        verbose: 0,
        ..Options::default()
    };
    assert_eq!(assemble(&options, &reader).unwrap().binary, vec![1, 2]);
}

#[test]
fn test_outfile_pragma() {
    let mut reader = MockFileReader::default();
    reader.add_file("test.oph", ".outfile \"game.bin\"\n.byte 1\n");
    let assembly = assemble(&quiet_options(), &reader).unwrap();
    assert_eq!(assembly.outfile, "game.bin");

    let options = Options {
        outfile: Some("cli.bin".to_string()),
        ..quiet_options()
    };
    let assembly = assemble(&options, &reader).unwrap();
    assert_eq!(assembly.outfile, "cli.bin");
}

#[test]
fn test_default_outfile() {
    let mut reader = MockFileReader::default();
    reader.add_file("test.oph", ".byte 1\n");
    let assembly = assemble(&quiet_options(), &reader).unwrap();
    assert_eq!(assembly.outfile, "ophis.bin");
}

#[test]
fn test_listing_output() {
    let mut reader = MockFileReader::default();
    reader.add_file("test.oph", ".org $0400\nlda #$41\n.byte \"AB\"\n");
    let options = Options {
        listfile: Some("test.lst".to_string()),
        ..quiet_options()
    };
    let listing = assemble(&options, &reader).unwrap().listing.unwrap();
    assert!(listing.contains("Source file: test.oph"));
    assert!(listing.contains(" 0400  A9 41"));
    assert!(listing.contains("lda #$41"));
    assert!(listing.contains(" 0402  41 42"));
    assert!(listing.contains("|AB"));
}

#[test]
fn test_label_map_output() {
    let mut reader = MockFileReader::default();
    reader.add_file("test.oph", ".org $0400\nmain: rts\n");
    let options = Options {
        mapfile: Some("test.map".to_string()),
        ..quiet_options()
    };
    let map = assemble(&options, &reader).unwrap().label_map.unwrap();
    assert_eq!(map.trim_end(), "$0400 | main | test.oph:2");
}

#[test]
fn test_real_files_through_asm_file_reader() {
    use ophis::file_reader::AsmFileReader;
    use std::fs;

    let dir = tempfile::tempdir().unwrap();
    let src_path = dir.path().join("prog.oph");
    let bin_path = dir.path().join("payload.bin");
    fs::write(&bin_path, [9u8, 8, 7]).unwrap();
    fs::write(
        &src_path,
        format!(".byte 1\n.incbin \"{}\"\n", bin_path.display()),
    )
    .unwrap();

    let options = Options {
        infiles: vec![src_path.display().to_string()],
        verbose: 0,
        ..Options::default()
    };
    let assembly = assemble(&options, &AsmFileReader).unwrap();
    assert_eq!(assembly.binary, vec![1, 9, 8, 7]);
    assert_eq!(assembly.code, 0);
    assert_eq!(assembly.data, 4);
}

#[test]
fn test_summary_counters() {
    let mut reader = MockFileReader::default();
    reader.add_file("test.oph", "lda #1\n.byte 2,3\n.advance 6\n");
    let assembly = assemble(&quiet_options(), &reader).unwrap();
    assert_eq!(assembly.binary, vec![0xA9, 0x01, 0x02, 0x03, 0x00, 0x00]);
    assert_eq!(assembly.code, 2);
    assert_eq!(assembly.data, 2);
    assert_eq!(assembly.filler, 2);
}
