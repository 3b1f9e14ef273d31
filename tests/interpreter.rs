#[cfg(test)]
mod interpreter_tests {
    use std::cell::RefCell;
    use std::io::{self, Write};
    use std::rc::Rc;
    use std::thread;

    use pretty_assertions::assert_eq;

    use rox::driver::{self, Outcome, Session, Stage};
    use rox::interpreter::MAX_CALL_DEPTH;

    /// Run `source` as a program, returning what it printed and the outcome.
    fn run(source: &str) -> (String, Outcome) {
        let mut out: Vec<u8> = Vec::new();
        let outcome = driver::run(source, &mut out).unwrap();

        (String::from_utf8(out).unwrap(), outcome)
    }

    fn run_ok(source: &str) -> String {
        let (output, outcome) = run(source);
        assert!(
            outcome.is_success(),
            "unexpected diagnostics: {:?}",
            outcome.diagnostics()
        );

        output
    }

    fn runtime_message(outcome: &Outcome) -> String {
        match outcome {
            Outcome::RuntimeError(e) => e.to_string(),
            other => panic!("expected a runtime error, got {:?}", other),
        }
    }

    /// A `Write` sink the test can still read after handing it to a session.
    #[derive(Clone, Default)]
    struct SharedBuf(Rc<RefCell<Vec<u8>>>);

    impl SharedBuf {
        fn take(&self) -> String {
            String::from_utf8(self.0.borrow_mut().drain(..).collect()).unwrap()
        }
    }

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.borrow_mut().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    // ───────────────────────────── values ──────────────────────────────

    #[test]
    fn test_print_values() {
        let output = run_ok(
            "print 1; print 2.5; print \"hi\"; print true; print nil; print -0.5; print 10 / 4;",
        );

        assert_eq!(output, "1\n2.5\nhi\ntrue\nnil\n-0.5\n2.5\n");
    }

    #[test]
    fn test_string_concatenation() {
        assert_eq!(run_ok("print \"foo\" + \"bar\";"), "foobar\n");
    }

    #[test]
    fn test_equality_never_crosses_types() {
        let output = run_ok("print 1 == \"1\"; print nil == false; print nil == nil; print \"a\" != \"b\";");

        assert_eq!(output, "false\nfalse\ntrue\ntrue\n");
    }

    #[test]
    fn test_truthiness() {
        let output = run_ok("if (0) print \"zero\"; if (\"\") print \"empty\"; if (nil) print \"nil\"; else print \"falsy\";");

        assert_eq!(output, "zero\nempty\nfalsy\n");
    }

    #[test]
    fn test_large_numbers_print_in_exponent_form() {
        let output = run_ok(
            "print 100000000000000000000000; print -1000000000000000000000; print 1000000;",
        );

        assert_eq!(output, "1e+23\n-1e+21\n1000000\n");
    }

    #[test]
    fn test_division_by_zero_is_infinity() {
        assert_eq!(run_ok("print 1 / 0; print -1 / 0;"), "Infinity\n-Infinity\n");
    }

    #[test]
    fn test_logical_operators_return_operands() {
        let output = run_ok("print nil or \"yes\"; print 1 and 2; print false and 1;");

        assert_eq!(output, "yes\n2\nfalse\n");
    }

    #[test]
    fn test_short_circuit_skips_right_side() {
        let output = run_ok(
            "var a = 0;
             fun bump() { a = a + 1; return true; }
             print true or bump();
             print false and bump();
             print a;",
        );

        assert_eq!(output, "true\nfalse\n0\n");
    }

    // ───────────────────────────── scoping ─────────────────────────────

    #[test]
    fn test_block_shadowing() {
        let output = run_ok("var a = 1; { var a = 2; print a; } print a;");

        assert_eq!(output, "2\n1\n");
    }

    #[test]
    fn test_assignment_reaches_enclosing_scope() {
        let output = run_ok("var a = 1; { a = 2; } print a;");

        assert_eq!(output, "2\n");
    }

    #[test]
    fn test_self_initializer_reads_outer_binding() {
        let output = run_ok("var a = \"outer\"; { var a = a + \"!\"; print a; }");

        assert_eq!(output, "outer!\n");
    }

    #[test]
    fn test_closure_binding_is_static() {
        let output = run_ok(
            "var a = \"global\";
             {
               fun showA() { print a; }
               showA();
               var a = \"block\";
               showA();
             }",
        );

        assert_eq!(output, "global\nglobal\n");
    }

    #[test]
    fn test_while_and_for_loops() {
        let output = run_ok(
            "var i = 0; while (i < 2) { print i; i = i + 1; }
             for (var j = 0; j < 3; j = j + 1) print j * 10;",
        );

        assert_eq!(output, "0\n1\n0\n10\n20\n");
    }

    // ──────────────────────────── functions ────────────────────────────

    #[test]
    fn test_counter_closure_keeps_state() {
        let output = run_ok(
            "fun makeCounter() {
               var i = 0;
               fun count() { i = i + 1; print i; }
               return count;
             }
             var counter = makeCounter();
             counter();
             counter();",
        );

        assert_eq!(output, "1\n2\n");
    }

    #[test]
    fn test_recursion() {
        let output = run_ok(
            "fun fib(n) { if (n < 2) return n; return fib(n - 1) + fib(n - 2); }
             print fib(15);",
        );

        assert_eq!(output, "610\n");
    }

    #[test]
    fn test_return_unwinds_loops() {
        let output = run_ok(
            "fun first() { for (var i = 0; ; i = i + 1) { if (i == 3) return i; } }
             print first();",
        );

        assert_eq!(output, "3\n");
    }

    #[test]
    fn test_implicit_nil_return_and_function_display() {
        let output = run_ok("fun f() {} print f(); print f; print clock;");

        assert_eq!(output, "nil\n<fn f>\n<native fn>\n");
    }

    #[test]
    fn test_clock_returns_seconds() {
        let output = run_ok("print clock() > 1000000000;");

        assert_eq!(output, "true\n");
    }

    #[test]
    fn test_functions_compare_by_identity() {
        let output = run_ok("fun f() {} var g = f; print f == g; print clock == clock;");

        assert_eq!(output, "true\ntrue\n");
    }

    /// Runs `source` on a thread with a roomy stack so depth tests measure
    /// the interpreter's limit rather than the test harness's.
    fn run_deep(source: String) -> (String, Outcome) {
        thread::Builder::new()
            .stack_size(64 * 1024 * 1024)
            .spawn(move || run(&source))
            .unwrap()
            .join()
            .unwrap()
    }

    const COUNT_DOWN: &str = "fun f(n) { if (n == 0) return 0; return 1 + f(n - 1); }";

    #[test]
    fn test_recursion_below_the_call_limit() {
        let depth = MAX_CALL_DEPTH - 5;
        let (output, outcome) = run_deep(format!("{} print f({});", COUNT_DOWN, depth));

        assert!(outcome.is_success(), "{:?}", outcome.diagnostics());
        assert_eq!(output, format!("{}\n", depth));
    }

    #[test]
    fn test_runaway_recursion_is_a_runtime_error() {
        let (output, outcome) = run_deep(format!("{}\nprint f(3000);", COUNT_DOWN));

        assert_eq!(output, "");
        assert_eq!(outcome.exit_code(), 70);
        assert_eq!(runtime_message(&outcome), "Stack overflow.\n[line 1]");
    }

    #[test]
    fn test_session_recovers_after_stack_overflow() {
        let (codes, output) = thread::Builder::new()
            .stack_size(64 * 1024 * 1024)
            .spawn(|| {
                let buf = SharedBuf::default();
                let mut session = Session::with_output(Box::new(buf.clone()));

                let lines = [
                    "fun down(n) { if (n == 0) return 0; return down(n - 1); }".to_string(),
                    format!("down({});", MAX_CALL_DEPTH + 1),
                    "print down(3);".to_string(),
                ];

                let codes: Vec<i32> = lines
                    .into_iter()
                    .map(|line| session.run_line(line).unwrap().exit_code())
                    .collect();

                (codes, buf.take())
            })
            .unwrap()
            .join()
            .unwrap();

        assert_eq!(codes, vec![0, 70, 0]);
        assert_eq!(output, "0\n");
    }

    // ────────────────────────── runtime errors ─────────────────────────

    #[test]
    fn test_mixed_addition_is_a_runtime_error() {
        let (output, outcome) = run("print \"ok\";\nprint \"10\" + 20;\nprint \"unreached\";");

        assert_eq!(output, "ok\n");
        assert_eq!(outcome.exit_code(), 70);
        assert_eq!(
            runtime_message(&outcome),
            "Operands must be two numbers or two strings.\n[line 2]"
        );
    }

    #[test]
    fn test_arity_mismatch_aborts_program() {
        let (output, outcome) = run("fun f(a, b) {}\nprint 1;\nf(1);\nprint 2;");

        assert_eq!(output, "1\n");
        assert_eq!(
            runtime_message(&outcome),
            "Expected 2 arguments but got 1.\n[line 3]"
        );
    }

    #[test]
    fn test_calling_a_non_function() {
        let (_, outcome) = run("\"str\"();");

        assert_eq!(
            runtime_message(&outcome),
            "Can only call functions and classes.\n[line 1]"
        );
    }

    #[test]
    fn test_operand_type_errors() {
        let (_, neg) = run("print -\"x\";");
        let (_, cmp) = run("print 1 < \"2\";");

        assert_eq!(runtime_message(&neg), "Operand must be a number.\n[line 1]");
        assert_eq!(runtime_message(&cmp), "Operands must be numbers.\n[line 1]");
    }

    #[test]
    fn test_undefined_variable() {
        let (_, read) = run("print missing;");
        let (_, write) = run("missing = 1;");

        assert_eq!(runtime_message(&read), "Undefined variable 'missing'.\n[line 1]");
        assert_eq!(runtime_message(&write), "Undefined variable 'missing'.\n[line 1]");
    }

    // ─────────────────────────── static errors ─────────────────────────

    #[test]
    fn test_static_errors_prevent_execution() {
        let (output, outcome) = run("print \"side effect\";\n{ var a; var a; }");

        assert_eq!(output, "");
        assert_eq!(outcome.exit_code(), 65);
        assert!(matches!(
            outcome,
            Outcome::StaticErrors {
                stage: Stage::Resolving,
                ..
            }
        ));
    }

    #[test]
    fn test_lexical_and_syntax_errors_reported_together() {
        let (output, outcome) = run("print @;\nprint 1");

        assert_eq!(output, "");
        assert_eq!(outcome.exit_code(), 65);

        let messages: Vec<String> = outcome.diagnostics().iter().map(|e| e.to_string()).collect();
        assert_eq!(
            messages,
            vec![
                "[line 1] Error: Unexpected character: @",
                "[line 1] Error at ';': Expect expression.",
                "[line 2] Error at end: Expect ';' after value.",
            ]
        );
    }

    // ─────────────────────────── other commands ────────────────────────

    #[test]
    fn test_evaluate_command() {
        let mut out: Vec<u8> = Vec::new();
        let outcome = driver::evaluate("(1 + 2) * 4 == 12", &mut out).unwrap();

        assert!(outcome.is_success());
        assert_eq!(String::from_utf8(out).unwrap(), "true\n");
    }

    #[test]
    fn test_evaluate_runtime_error() {
        let mut out: Vec<u8> = Vec::new();
        let outcome = driver::evaluate("-true", &mut out).unwrap();

        assert_eq!(outcome.exit_code(), 70);
        assert!(out.is_empty());
    }

    #[test]
    fn test_tokenize_command() {
        let mut out: Vec<u8> = Vec::new();
        let outcome = driver::tokenize("var x = \"s\";", &mut out, false).unwrap();

        assert!(outcome.is_success());
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "VAR var null\nIDENTIFIER x null\nEQUAL = null\nSTRING \"s\" s\nSEMICOLON ; null\nEOF  null\n"
        );
    }

    #[test]
    fn test_tokenize_json_and_errors() {
        let mut out: Vec<u8> = Vec::new();
        let outcome = driver::tokenize("1 $", &mut out, true).unwrap();

        assert_eq!(outcome.exit_code(), 65);
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "{\"token_type\":{\"NUMBER\":1.0},\"lexeme\":\"1\",\"line\":1}\n\
             {\"token_type\":\"EOF\",\"lexeme\":\"\",\"line\":1}\n"
        );
    }

    // ────────────────────────────── session ────────────────────────────

    #[test]
    fn test_session_keeps_state_between_lines() {
        let buf = SharedBuf::default();
        let mut session = Session::with_output(Box::new(buf.clone()));

        let lines = [
            "var greeting = \"hi\";",
            "fun greet(name) { return greeting + \" \" + name; }",
            "print greet(\"bob\");",
        ];
        for line in lines {
            assert!(session.run_line(line.to_string()).unwrap().is_success());
        }

        assert_eq!(buf.take(), "hi bob\n");
    }

    #[test]
    fn test_session_survives_errors() {
        let buf = SharedBuf::default();
        let mut session = Session::with_output(Box::new(buf.clone()));

        let outcome = session.run_line("print nope;".to_string()).unwrap();
        assert_eq!(outcome.exit_code(), 70);

        let outcome = session.run_line("print (;".to_string()).unwrap();
        assert_eq!(outcome.exit_code(), 65);

        let outcome = session
            .run_line("var n = 1; { var m = n + 1; print m; }".to_string())
            .unwrap();
        assert!(outcome.is_success());
        assert_eq!(buf.take(), "2\n");
    }

    #[test]
    fn test_block_scope_is_restored_after_runtime_error() {
        let buf = SharedBuf::default();
        let mut session = Session::with_output(Box::new(buf.clone()));

        let outcome = session.run_line("var a = \"global\";".to_string()).unwrap();
        assert!(outcome.is_success());

        let outcome = session
            .run_line("{ var a = \"local\"; nil(); }".to_string())
            .unwrap();
        assert_eq!(outcome.exit_code(), 70);

        let outcome = session.run_line("print a;".to_string()).unwrap();
        assert!(outcome.is_success());
        assert_eq!(buf.take(), "global\n");
    }

    #[test]
    fn test_session_closures_resolve_across_lines() {
        let buf = SharedBuf::default();
        let mut session = Session::with_output(Box::new(buf.clone()));

        for line in [
            "fun make() { var c = 0; fun inc() { c = c + 1; return c; } return inc; }",
            "var inc = make();",
            "inc();",
            "print inc();",
        ] {
            assert!(session.run_line(line.to_string()).unwrap().is_success());
        }

        assert_eq!(buf.take(), "2\n");
    }
}
