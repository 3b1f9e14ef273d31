#[cfg(test)]
mod resolver_tests {
    use pretty_assertions::assert_eq;

    use rox::ast::{Expr, Stmt};
    use rox::parser::Parser;
    use rox::resolver::{Locals, Resolver};
    use rox::scanner::scan_tokens;

    fn resolve_errors(source: &str) -> Vec<String> {
        let (tokens, _) = scan_tokens(source);
        let statements = Parser::new(&tokens).parse().unwrap();

        match Resolver::new().resolve(&statements) {
            Ok(_) => Vec::new(),
            Err(errors) => errors.iter().map(|e| e.to_string()).collect(),
        }
    }

    #[test]
    fn test_redeclaration_in_same_local_scope() {
        let errors = resolve_errors("{ var a = 1; var a = 2; }");

        assert_eq!(
            errors,
            vec!["[line 1] Error at 'a': Already a variable with this name in this scope."]
        );
    }

    #[test]
    fn test_shadowing_in_nested_scope_is_allowed() {
        assert!(resolve_errors("{ var a = 1; { var a = 2; } }").is_empty());
    }

    #[test]
    fn test_global_redeclaration_is_allowed() {
        assert!(resolve_errors("var a = 1; var a = 2;").is_empty());
    }

    #[test]
    fn test_return_at_top_level() {
        let errors = resolve_errors("return 1;");

        assert_eq!(
            errors,
            vec!["[line 1] Error at 'return': Can't return from top-level code."]
        );
    }

    #[test]
    fn test_return_inside_function_is_allowed() {
        assert!(resolve_errors("fun f() { if (true) return 1; return; }").is_empty());
    }

    #[test]
    fn test_parameter_and_body_share_a_scope() {
        let errors = resolve_errors("fun f(a) { var a = 1; }");

        assert_eq!(
            errors,
            vec!["[line 1] Error at 'a': Already a variable with this name in this scope."]
        );
    }

    #[test]
    fn test_duplicate_parameter() {
        let errors = resolve_errors("fun f(a, a) {}");

        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn test_all_errors_are_collected() {
        let errors = resolve_errors("return;\n{ var x; var x; }\nreturn;");

        assert_eq!(errors.len(), 3);
        assert!(errors[2].starts_with("[line 3]"));
    }

    #[test]
    fn test_self_initializer_falls_through_to_enclosing_binding() {
        let source = "{ var a = 1; { var a = a; } }";
        let (tokens, _) = scan_tokens(source);
        let statements = Parser::new(&tokens).parse().unwrap();
        let locals: Locals = Resolver::new().resolve(&statements).unwrap();

        // The `a` read by the inner initializer lives one scope out.
        let Stmt::Block(outer) = &statements[0] else {
            panic!("expected block");
        };
        let Stmt::Block(inner) = &outer[1] else {
            panic!("expected inner block");
        };
        let Stmt::Var {
            initializer: Some(Expr::Variable { id, .. }),
            ..
        } = &inner[0]
        else {
            panic!("expected var with variable initializer");
        };

        assert_eq!(locals.depth(*id), Some(1));
    }

    #[test]
    fn test_globals_are_left_unresolved() {
        let source = "var g = 1; fun f(p) { print g + p; }";
        let (tokens, _) = scan_tokens(source);
        let statements = Parser::new(&tokens).parse().unwrap();
        let locals = Resolver::new().resolve(&statements).unwrap();

        // Only `p` resolves; `g` is looked up by name at runtime.
        assert_eq!(locals.len(), 1);
    }

    #[test]
    fn test_closure_reference_distance() {
        let source = "fun outer() { var x = 1; fun inner() { return x; } }";
        let (tokens, _) = scan_tokens(source);
        let statements = Parser::new(&tokens).parse().unwrap();
        let locals = Resolver::new().resolve(&statements).unwrap();

        let Stmt::Function(outer) = &statements[0] else {
            panic!("expected function");
        };
        let Stmt::Function(inner) = &outer.body[1] else {
            panic!("expected nested function");
        };
        let Stmt::Return {
            value: Some(Expr::Variable { id, .. }),
            ..
        } = &inner.body[0]
        else {
            panic!("expected return of a variable");
        };

        assert_eq!(locals.depth(*id), Some(1));
    }
}
