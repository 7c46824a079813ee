//! Escenarios de extremo a extremo sobre la tubería completa.

use oberon::{codegen, compile, interp};

fn run(source: &str) -> String {
    let program = compile(source).unwrap();

    let mut output = Vec::new();
    interp::run(&program, &mut output).unwrap();
    String::from_utf8(output).unwrap()
}

fn ir(source: &str) -> String {
    let program = compile(source).unwrap();

    let mut output = Vec::new();
    codegen::emit(&program, &mut output).unwrap();
    String::from_utf8(output).unwrap()
}

#[test]
fn hello_world() {
    let source = "MODULE H; BEGIN Write(\"Hi\"); WriteLn(); END H.";

    assert_eq!(run(source), "Hi\n");

    let ir = ir(source);
    assert!(ir.contains("; ModuleID = \"oberon_module\""));
    assert!(ir.contains("declare i32 @printf(i8*, ...)"));
    assert!(ir.contains("@.str1 = private constant [3 x i8] c\"Hi\\00\""));
}

#[test]
fn sums_variables() {
    let source = "MODULE S; VAR a,b,s: INTEGER; BEGIN a:=10; b:=20; s:=a+b; Write(s); WriteLn(); END S.";

    assert_eq!(run(source), "30\n");
    assert!(ir(source).contains("add i32"));
}

#[test]
fn counts_inclusively() {
    let source = "MODULE L; VAR i: INTEGER; BEGIN FOR i:=1 TO 3 DO Write(i); Write(\" \"); END; WriteLn(); END L.";

    assert_eq!(run(source), "1 2 3 \n");
    assert!(ir(source).contains("icmp sle i32"));
}

#[test]
fn computes_factorial_recursively() {
    let source = "MODULE F; PROCEDURE f(n:INTEGER):INTEGER; BEGIN IF n<=1 THEN RETURN 1; ELSE RETURN n*f(n-1); END; END f; BEGIN Write(f(5)); WriteLn(); END F.";

    assert_eq!(run(source), "120\n");

    let ir = ir(source);
    assert!(ir.contains("define i32 @f(i32 %n) {"));
    assert!(ir.contains("= call i32 @f(i32 %t"));
}

#[test]
fn indexes_multidimensional_arrays() {
    let source = "MODULE M; VAR m: ARRAY 2,2 OF INTEGER; i,j: INTEGER; BEGIN FOR i:=0 TO 1 DO FOR j:=0 TO 1 DO m[i,j]:=i*10+j; END; END; Write(m[1,0]); WriteLn(); END M.";

    assert_eq!(run(source), "10\n");
    assert!(ir(source).contains("getelementptr inbounds [2 x [2 x i32]]"));
}

#[test]
fn reports_undeclared_identifiers_with_nonzero_exit() {
    let error = compile("MODULE E; BEGIN x := 1; END E.").unwrap_err();

    let message = error.to_string();
    assert!(message.starts_with("semantic: "));
    assert!(message.contains("undeclared"));
    assert!(message.contains("x"));
    assert_ne!(error.exit_code(), 0);
}

#[test]
fn string_globals_sit_at_the_bottom_of_the_module() {
    let ir = ir("MODULE H; BEGIN Write(\"Hi\"); WriteLn(); END H.");

    let main_position = ir.find("define i32 @main()").unwrap();
    let string_position = ir.find("@.str1 = private constant").unwrap();
    assert!(string_position > main_position);
}
