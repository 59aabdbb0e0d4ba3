//! End-to-end scenarios: source in, observable stdout out.

use std::io::{BufReader, Cursor, Write};
use std::sync::{Arc, Mutex};

use stackvm::lexer;
use stackvm::natives::Registry;
use stackvm::parser;
use stackvm::vm::Vm;

#[derive(Clone)]
struct SharedBuf(Arc<Mutex<Vec<u8>>>);

impl Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }
    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

fn run(src: &str) -> String {
    let mut file = tempfile::Builder::new().suffix(".asm").tempfile().unwrap();
    file.write_all(src.as_bytes()).unwrap();

    let lines = lexer::lex_file(file.path(), None).expect("lex");
    let program = parser::parse(&lines).expect("parse");

    let captured = Arc::new(Mutex::new(Vec::new()));
    let mut vm = Vm::with_io(
        program,
        Registry::with_stdlib(),
        Box::new(BufReader::new(Cursor::new(Vec::new()))),
        Box::new(SharedBuf(captured.clone())),
        Box::new(Vec::new()),
    );
    vm.run().expect("run");
    String::from_utf8(captured.lock().unwrap().clone()).unwrap()
}

#[test]
fn scenario_1_integer_addition() {
    assert_eq!(run("_start:\npush 2\npush 3\niadd\ndmpln\nhalt\n"), "5\n");
}

#[test]
fn scenario_2_float_division() {
    assert_eq!(run("_start:\npush 4.0\npush 2.0\nfdiv\ndmpln\nhalt\n"), "2\n");
}

#[test]
fn scenario_3_multi_macro_squares_argument() {
    let src = "#sq x {\npush x\npush x\nimul\n}\n_start:\n@sq 7\ndmpln\nhalt\n";
    assert_eq!(run(src), "49\n");
}

#[test]
fn scenario_4_loop_prints_counter() {
    let src = "_start:\npush 10\npush 1\n_loop:\ndec\ndup 0\npush 0\ncmp\njne _loop\npop\ndmpln\nhalt\n";
    assert_eq!(run(src), "10\n");
}

#[test]
fn scenario_5_prints_string() {
    assert_eq!(run("_start:\npush \"hi\"\ndmpln\nhalt\n"), "hi\n");
}

#[test]
fn scenario_6_call_ret_preserves_stack() {
    let src = "_start:\ncall foo\ndmpln\nhalt\nfoo:\npush 1\nret\n";
    assert_eq!(run(src), "1\n");
}

#[test]
fn single_macro_inline_splice() {
    let src = "#two 2\n_start:\npush @two\ndmpln\nhalt\n";
    assert_eq!(run(src), "2\n");
}

#[test]
fn include_directive_merges_macros() {
    let included_dir = tempfile::tempdir().unwrap();
    let included_path = included_dir.path().join("lib.asm");
    std::fs::write(&included_path, "#ten 10\n").unwrap();

    let main_path = included_dir.path().join("main.asm");
    std::fs::write(&main_path, "#\"lib.asm\"\n_start:\npush @ten\ndmpln\nhalt\n").unwrap();

    let lines = lexer::lex_file(&main_path, None).expect("lex");
    let program = parser::parse(&lines).expect("parse");

    let captured = Arc::new(Mutex::new(Vec::new()));
    let mut vm = Vm::with_io(
        program,
        Registry::with_stdlib(),
        Box::new(BufReader::new(Cursor::new(Vec::new()))),
        Box::new(SharedBuf(captured.clone())),
        Box::new(Vec::new()),
    );
    vm.run().expect("run");
    assert_eq!(String::from_utf8(captured.lock().unwrap().clone()).unwrap(), "10\n");
}
