//! Golden parser tests over hand-assembled binaries.

use minwasm::error::ParseError;
use minwasm::model::{
    ConstantExpression, ExternalKind, ImportDesc, Instr, Limits, ValType,
};
use minwasm::parse;

const PREFIX: [u8; 8] = [0x00, 0x61, 0x73, 0x6D, 0x01, 0x00, 0x00, 0x00];

fn module_bytes(sections: &[(u8, Vec<u8>)]) -> Vec<u8> {
    let mut bin = PREFIX.to_vec();
    for (id, payload) in sections {
        bin.push(*id);
        bin.push(payload.len() as u8);
        bin.extend_from_slice(payload);
    }
    bin
}

// functype () -> ()
fn functype_void_to_void() -> Vec<u8> {
    vec![0x60, 0x00, 0x00]
}

#[test]
fn empty_module() {
    let module = parse(&PREFIX).unwrap();
    assert!(module.types.is_empty());
    assert!(module.functions.is_empty());
    assert!(module.codes.is_empty());
    assert!(module.start.is_none());
}

#[test]
fn module_with_wrong_prefix() {
    assert_eq!(parse(&[]), Err(ParseError::InvalidPrefix));
    assert_eq!(parse(&[0x00, 0x61, 0x73]), Err(ParseError::InvalidPrefix));
    assert_eq!(
        parse(&[0x00, 0x61, 0x73, 0xD6, 0x00, 0x00, 0x00, 0x00]),
        Err(ParseError::InvalidPrefix)
    );
    assert_eq!(
        parse(&[0x00, 0x61, 0x73, 0x6D, 0x02, 0x00, 0x00, 0x00]),
        Err(ParseError::InvalidPrefix)
    );
}

#[test]
fn custom_sections_are_skipped() {
    let module = parse(&module_bytes(&[(0, vec![])])).unwrap();
    assert!(module.types.is_empty());

    let module = parse(&module_bytes(&[(0, vec![0xFF])])).unwrap();
    assert!(module.types.is_empty());

    // Custom sections may appear between standard ones.
    let module = parse(&module_bytes(&[
        (0, vec![0x01, b'x', 0xAA]),
        (1, {
            let mut p = vec![0x01];
            p.extend(functype_void_to_void());
            p
        }),
        (0, vec![]),
    ]))
    .unwrap();
    assert_eq!(module.types.len(), 1);
}

#[test]
fn table_element_data_sections_are_skipped() {
    // Payloads are opaque when skipped; garbage is fine.
    let module = parse(&module_bytes(&[
        (4, vec![0x01, 0x70, 0x00, 0x00]),
        (9, vec![0xDE, 0xAD]),
        (11, vec![0xBE, 0xEF]),
    ]))
    .unwrap();
    assert!(module.types.is_empty());
}

#[test]
fn unknown_section_rejected() {
    assert!(matches!(
        parse(&module_bytes(&[(12, vec![])])),
        Err(ParseError::UnknownSection { id: 12, .. })
    ));
}

#[test]
fn functype_wrong_prefix() {
    let bin = module_bytes(&[(1, vec![0x01, 0x61, 0x00, 0x00])]);
    assert!(matches!(
        parse(&bin),
        Err(ParseError::Malformed {
            msg: "expected functype prefix 0x60",
            ..
        })
    ));
}

#[test]
fn type_section_with_single_functype() {
    let mut payload = vec![0x01];
    payload.extend(functype_void_to_void());
    let module = parse(&module_bytes(&[(1, payload)])).unwrap();
    assert_eq!(module.types.len(), 1);
    assert!(module.types[0].params.is_empty());
    assert!(module.types[0].results.is_empty());
}

#[test]
fn type_section_with_single_functype_params() {
    // (i32, i64) -> i32
    let payload = vec![0x01, 0x60, 0x02, 0x7F, 0x7E, 0x01, 0x7F];
    let module = parse(&module_bytes(&[(1, payload)])).unwrap();
    assert_eq!(module.types.len(), 1);
    assert_eq!(module.types[0].params, vec![ValType::I32, ValType::I64]);
    assert_eq!(module.types[0].results, vec![ValType::I32]);
}

#[test]
fn type_section_with_multiple_functypes() {
    // () -> (), (i32, i64) -> i32, (i32) -> ()
    let payload = vec![
        0x03, 0x60, 0x00, 0x00, 0x60, 0x02, 0x7F, 0x7E, 0x01, 0x7F, 0x60, 0x01, 0x7F, 0x00,
    ];
    let module = parse(&module_bytes(&[(1, payload)])).unwrap();
    assert_eq!(module.types.len(), 3);
    assert_eq!(module.types[1].params, vec![ValType::I32, ValType::I64]);
    assert_eq!(module.types[2].params, vec![ValType::I32]);
    assert!(module.types[2].results.is_empty());
}

#[test]
fn float_valtype_unsupported() {
    let payload = vec![0x01, 0x60, 0x01, 0x7D, 0x00];
    assert!(matches!(
        parse(&module_bytes(&[(1, payload)])),
        Err(ParseError::Unsupported {
            msg: "floating-point value type",
            ..
        })
    ));
}

#[test]
fn multiple_results_unsupported() {
    let payload = vec![0x01, 0x60, 0x00, 0x02, 0x7F, 0x7F];
    assert!(matches!(
        parse(&module_bytes(&[(1, payload)])),
        Err(ParseError::Unsupported {
            msg: "more than one function result",
            ..
        })
    ));
}

#[test]
fn type_section_larger_than_expected() {
    let mut payload = vec![0x01];
    payload.extend(functype_void_to_void());
    let mut bin = PREFIX.to_vec();
    bin.push(1);
    bin.push(payload.len() as u8 - 1); // declared size one byte short
    bin.extend_from_slice(&payload);
    assert!(matches!(
        parse(&bin),
        Err(ParseError::SectionSizeMismatch { id: 1, .. })
    ));
}

#[test]
fn type_section_smaller_than_expected() {
    let mut payload = vec![0x01];
    payload.extend(functype_void_to_void());
    payload.push(0xFE); // trailing garbage inside the declared size
    assert!(matches!(
        parse(&module_bytes(&[(1, payload)])),
        Err(ParseError::SectionSizeMismatch { id: 1, .. })
    ));
}

#[test]
fn code_with_empty_expr_2_locals() {
    let bin = module_bytes(&[
        (1, {
            let mut p = vec![0x01];
            p.extend(functype_void_to_void());
            p
        }),
        (3, vec![0x01, 0x00]),
        // one body: 2x i32 locals, end
        (10, vec![0x01, 0x04, 0x01, 0x02, 0x7F, 0x0B]),
    ]);
    let module = parse(&bin).unwrap();
    assert_eq!(module.codes.len(), 1);
    assert_eq!(module.codes[0].local_count, 2);
    assert_eq!(module.codes[0].instructions, vec![Instr::End]);
    assert!(module.codes[0].immediates.is_empty());
}

#[test]
fn code_with_empty_expr_5_locals() {
    let bin = module_bytes(&[
        (1, {
            let mut p = vec![0x01];
            p.extend(functype_void_to_void());
            p
        }),
        (3, vec![0x01, 0x00]),
        // one body: 1x i32 + 4x i64 locals, end
        (10, vec![0x01, 0x06, 0x02, 0x01, 0x7F, 0x04, 0x7E, 0x0B]),
    ]);
    let module = parse(&bin).unwrap();
    assert_eq!(module.codes[0].local_count, 5);
    assert_eq!(module.codes[0].instructions, vec![Instr::End]);
}

#[test]
fn code_section_with_2_trivial_codes() {
    let bin = module_bytes(&[
        (1, {
            let mut p = vec![0x01];
            p.extend(functype_void_to_void());
            p
        }),
        (3, vec![0x02, 0x00, 0x00]),
        (10, vec![0x02, 0x02, 0x00, 0x0B, 0x02, 0x00, 0x0B]),
    ]);
    let module = parse(&bin).unwrap();
    assert_eq!(module.codes.len(), 2);
    for code in &module.codes {
        assert_eq!(code.local_count, 0);
        assert_eq!(code.instructions, vec![Instr::End]);
    }
}

#[test]
fn code_section_with_basic_instructions() {
    let body = [
        0x00, // no locals
        0x20, 0x01, // local.get 1
        0x21, 0x02, // local.set 2
        0x22, 0x03, // local.tee 3
        0x6A, // i32.add
        0x01, // nop
        0x00, // unreachable
        0x0B, // end
    ];
    let mut code_payload = vec![0x01, body.len() as u8];
    code_payload.extend_from_slice(&body);
    let bin = module_bytes(&[
        (1, {
            let mut p = vec![0x01];
            p.extend(functype_void_to_void());
            p
        }),
        (3, vec![0x01, 0x00]),
        (10, code_payload),
    ]);
    let module = parse(&bin).unwrap();
    assert_eq!(
        module.codes[0].instructions,
        vec![
            Instr::LocalGet,
            Instr::LocalSet,
            Instr::LocalTee,
            Instr::I32Add,
            Instr::Nop,
            Instr::Unreachable,
            Instr::End,
        ]
    );
    assert_eq!(
        module.codes[0].immediates,
        vec![1, 0, 0, 0, 2, 0, 0, 0, 3, 0, 0, 0]
    );
}

#[test]
fn milestone1() {
    // (func $add (param i32 i32) (result i32) (local i32)
    //   local.get 0; local.get 1; i32.add; local.get 2; i32.add;
    //   local.tee 2; local.get 0; i32.add)
    let bin = hex::decode(
        "0061736d0100000001070160027f7f017f030201000a13011101017f200020016a20026a220220006a0b",
    )
    .unwrap();
    let module = parse(&bin).unwrap();

    assert_eq!(module.types.len(), 1);
    assert_eq!(module.types[0].params, vec![ValType::I32, ValType::I32]);
    assert_eq!(module.types[0].results, vec![ValType::I32]);

    assert_eq!(module.codes.len(), 1);
    let code = &module.codes[0];
    assert_eq!(code.local_count, 1);
    assert_eq!(
        code.instructions,
        vec![
            Instr::LocalGet,
            Instr::LocalGet,
            Instr::I32Add,
            Instr::LocalGet,
            Instr::I32Add,
            Instr::LocalTee,
            Instr::LocalGet,
            Instr::I32Add,
            Instr::End,
        ]
    );
    assert_eq!(
        code.immediates,
        hex::decode("0000000001000000020000000200000000000000").unwrap()
    );
}

#[test]
fn function_and_code_count_must_agree() {
    let bin = module_bytes(&[
        (1, {
            let mut p = vec![0x01];
            p.extend(functype_void_to_void());
            p
        }),
        (3, vec![0x02, 0x00, 0x00]),
        (10, vec![0x01, 0x02, 0x00, 0x0B]),
    ]);
    assert!(matches!(
        parse(&bin),
        Err(ParseError::Malformed {
            msg: "function and code section length mismatch",
            ..
        })
    ));
}

#[test]
fn import_section_kinds() {
    // func import "m.f" type 0, memory import "m.mem" {1,2}, global import "m.g" i32 mut
    let mut payload = vec![0x03];
    payload.extend_from_slice(&[0x01, b'm', 0x01, b'f', 0x00, 0x00]);
    payload.extend_from_slice(&[0x01, b'm', 0x03, b'm', b'e', b'm', 0x02, 0x01, 0x01, 0x02]);
    payload.extend_from_slice(&[0x01, b'm', 0x01, b'g', 0x03, 0x7F, 0x01]);
    let bin = module_bytes(&[
        (1, {
            let mut p = vec![0x01];
            p.extend(functype_void_to_void());
            p
        }),
        (2, payload),
    ]);
    let module = parse(&bin).unwrap();
    assert_eq!(module.imports.len(), 3);
    assert_eq!(module.imported_function_count, 1);
    assert_eq!(module.imported_memory_count, 1);
    assert_eq!(module.imported_global_count, 1);
    assert_eq!(module.imports[0].module, "m");
    assert_eq!(module.imports[0].name, "f");
    assert_eq!(module.imports[0].desc, ImportDesc::Function(0));
    assert_eq!(
        module.imports[1].desc,
        ImportDesc::Memory(Limits::new(1, Some(2)))
    );
    assert_eq!(module.imports[2].desc, ImportDesc::Global { is_mutable: true });
}

#[test]
fn table_import_unsupported() {
    let payload = vec![0x01, 0x01, b'm', 0x01, b't', 0x01, 0x70, 0x00, 0x00];
    assert!(matches!(
        parse(&module_bytes(&[(2, payload)])),
        Err(ParseError::Unsupported {
            msg: "table import",
            ..
        })
    ));
}

#[test]
fn import_name_must_be_valid_utf8() {
    let payload = vec![0x01, 0x02, 0xC0, 0xAF, 0x01, b'f', 0x00, 0x00];
    assert!(matches!(
        parse(&module_bytes(&[(2, payload)])),
        Err(ParseError::InvalidUtf8 { .. })
    ));
}

#[test]
fn memory_section() {
    let module = parse(&module_bytes(&[(5, vec![0x01, 0x00, 0x01])])).unwrap();
    assert_eq!(module.memories, vec![Limits::new(1, None)]);

    assert!(matches!(
        parse(&module_bytes(&[(5, vec![0x02, 0x00, 0x01, 0x00, 0x01])])),
        Err(ParseError::Malformed {
            msg: "more than one memory",
            ..
        })
    ));
}

#[test]
fn global_section() {
    // (mut i32 = 42), (const i64 = global.get 0)
    let payload = vec![
        0x02, 0x7F, 0x01, 0x41, 0x2A, 0x0B, 0x7E, 0x00, 0x23, 0x00, 0x0B,
    ];
    let module = parse(&module_bytes(&[(6, payload)])).unwrap();
    assert_eq!(module.globals.len(), 2);
    assert!(module.globals[0].is_mutable);
    assert_eq!(module.globals[0].init, ConstantExpression::Constant(42));
    assert!(!module.globals[1].is_mutable);
    assert_eq!(module.globals[1].init, ConstantExpression::GlobalGet(0));
}

#[test]
fn global_initializer_rejects_other_instructions() {
    // i32.add in an initializer
    let payload = vec![0x01, 0x7F, 0x00, 0x6A, 0x0B];
    assert!(matches!(
        parse(&module_bytes(&[(6, payload)])),
        Err(ParseError::MalformedConstExpr { opcode: 0x6A, .. })
    ));
}

#[test]
fn export_section_kinds() {
    let payload = vec![
        0x04, //
        0x01, b'f', 0x00, 0x00, //
        0x01, b't', 0x01, 0x01, //
        0x01, b'm', 0x02, 0x02, //
        0x01, b'g', 0x03, 0x03,
    ];
    let module = parse(&module_bytes(&[(7, payload)])).unwrap();
    assert_eq!(module.exports.len(), 4);
    assert_eq!(module.exports[0].kind, ExternalKind::Function);
    assert_eq!(module.exports[1].kind, ExternalKind::Table);
    assert_eq!(module.exports[2].kind, ExternalKind::Memory);
    assert_eq!(module.exports[3].kind, ExternalKind::Global);
    assert_eq!(module.exports[3].index, 3);

    let bad = vec![0x01, 0x01, b'x', 0x04, 0x00];
    assert!(matches!(
        parse(&module_bytes(&[(7, bad)])),
        Err(ParseError::Unsupported {
            msg: "unknown export kind",
            ..
        })
    ));
}

#[test]
fn start_section() {
    let bin = module_bytes(&[
        (1, {
            let mut p = vec![0x01];
            p.extend(functype_void_to_void());
            p
        }),
        (3, vec![0x01, 0x00]),
        (8, vec![0x00]),
        (10, vec![0x01, 0x02, 0x00, 0x0B]),
    ]);
    let module = parse(&bin).unwrap();
    assert_eq!(module.start, Some(0));
}

#[test]
fn local_count_overflow_rejected() {
    // two groups of 0x80000000 i32 locals each overflow u32
    let body = vec![
        0x02, // two groups
        0x80, 0x80, 0x80, 0x80, 0x08, 0x7F, // 0x80000000 x i32
        0x80, 0x80, 0x80, 0x80, 0x08, 0x7F, // 0x80000000 x i32
        0x0B,
    ];
    let mut code_payload = vec![0x01, body.len() as u8];
    code_payload.extend_from_slice(&body);
    let bin = module_bytes(&[
        (1, {
            let mut p = vec![0x01];
            p.extend(functype_void_to_void());
            p
        }),
        (3, vec![0x01, 0x00]),
        (10, code_payload),
    ]);
    assert!(matches!(
        parse(&bin),
        Err(ParseError::Malformed {
            msg: "local count overflows u32",
            ..
        })
    ));
}

#[test]
fn truncated_module_reports_eof() {
    // section declares 5 payload bytes but input ends
    let mut bin = PREFIX.to_vec();
    bin.extend_from_slice(&[0x01, 0x05, 0x60]);
    assert!(matches!(parse(&bin), Err(ParseError::UnexpectedEof { .. })));
}

#[test]
fn oversized_leb_section_size_rejected() {
    let mut bin = PREFIX.to_vec();
    bin.extend_from_slice(&[0x01, 0x80, 0x80, 0x80, 0x80, 0x80, 0x01]);
    assert!(matches!(
        parse(&bin),
        Err(ParseError::Leb128TooLong { .. })
    ));
}
