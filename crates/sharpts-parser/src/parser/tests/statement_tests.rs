use crate::ast::*;
use crate::parse_source;

fn parse(source: &str) -> Program {
    parse_source(source).expect("parse failed")
}

#[test]
fn parses_variable_declarations() {
    let program = parse("let x: number = 1, y = 2;");
    let StmtKind::VarDecl { kind, declarations } = &program.statements[0].kind else {
        panic!("expected var decl");
    };
    assert_eq!(*kind, VarKind::Let);
    assert_eq!(declarations.len(), 2);
    assert_eq!(declarations[0].name, "x");
    assert!(declarations[0].type_ann.is_some());
}

#[test]
fn desugars_c_style_for_into_while() {
    let program = parse("for (let i = 0; i < 3; i++) console.log(i);");
    let StmtKind::Block(stmts) = &program.statements[0].kind else {
        panic!("expected desugared block");
    };
    assert!(matches!(stmts[0].kind, StmtKind::VarDecl { .. }));
    let StmtKind::While { body, .. } = &stmts[1].kind else {
        panic!("expected while");
    };
    let StmtKind::Block(inner) = &body.kind else {
        panic!("expected loop body block");
    };
    // Body then step expression.
    assert_eq!(inner.len(), 2);
}

#[test]
fn desugars_object_destructuring() {
    let program = parse("let {a, b: c} = obj;");
    let StmtKind::VarDecl { declarations, .. } = &program.statements[0].kind else {
        panic!("expected var decl");
    };
    // temp + a + c
    assert_eq!(declarations.len(), 3);
    assert!(declarations[0].name.starts_with("__destructured_"));
    assert_eq!(declarations[1].name, "a");
    assert_eq!(declarations[2].name, "c");
}

#[test]
fn desugars_array_destructuring_with_rest() {
    let program = parse("const [x, , z, ...rest] = xs;");
    let StmtKind::VarDecl { declarations, .. } = &program.statements[0].kind else {
        panic!("expected var decl");
    };
    let names: Vec<&str> = declarations.iter().map(|d| d.name.as_str()).collect();
    assert!(names.contains(&"x"));
    assert!(names.contains(&"z"));
    assert!(names.contains(&"rest"));
    assert!(!names.contains(&""));
}

#[test]
fn desugars_parameter_properties() {
    let program = parse("class P { constructor(public x: number, private y: string) {} }");
    let StmtKind::Class(class) = &program.statements[0].kind else {
        panic!("expected class");
    };
    let fields: Vec<_> = class
        .members
        .iter()
        .filter(|m| matches!(m.kind, MemberKind::Field { .. }))
        .collect();
    assert_eq!(fields.len(), 2);
    assert_eq!(fields[1].accessibility, AccessModifier::Private);
    let ctor = class
        .members
        .iter()
        .find(|m| matches!(m.kind, MemberKind::Constructor { .. }))
        .expect("constructor");
    let MemberKind::Constructor { body: Some(body), .. } = &ctor.kind else {
        panic!("constructor body");
    };
    // Two `this.x = x` assignments precede the (empty) original body.
    assert_eq!(body.len(), 2);
}

#[test]
fn desugars_dotted_namespaces() {
    let program = parse("namespace A.B { let x = 1; }");
    let StmtKind::Namespace(outer) = &program.statements[0].kind else {
        panic!("expected namespace");
    };
    assert_eq!(outer.name, "A");
    let StmtKind::Namespace(inner) = &outer.body[0].kind else {
        panic!("expected nested namespace");
    };
    assert_eq!(inner.name, "B");
}

#[test]
fn parses_for_of_and_for_await_of() {
    let program = parse("for (const v of xs) {}\nfor await (const v of ys) {}");
    assert!(matches!(
        &program.statements[0].kind,
        StmtKind::ForOf { is_await: false, .. }
    ));
    assert!(matches!(
        &program.statements[1].kind,
        StmtKind::ForOf { is_await: true, .. }
    ));
}

#[test]
fn parses_overload_signatures_without_bodies() {
    let program = parse(
        "function f(x: number): number;\nfunction f(x: string): string;\nfunction f(x: any): any { return x; }",
    );
    let bodies: Vec<bool> = program
        .statements
        .iter()
        .map(|s| match &s.kind {
            StmtKind::Function(f) => f.body.is_some(),
            _ => panic!("expected function"),
        })
        .collect();
    assert_eq!(bodies, vec![false, false, true]);
}

#[test]
fn parses_labeled_break() {
    let program = parse("outer: while (true) { break outer; }");
    assert!(matches!(
        &program.statements[0].kind,
        StmtKind::Labeled { label, .. } if label == "outer"
    ));
}

#[test]
fn leading_string_statement_is_a_directive() {
    let program = parse("\"use strict\";\nlet x = 1;");
    assert!(matches!(
        &program.statements[0].kind,
        StmtKind::Directive(text) if text == "use strict"
    ));
}

#[test]
fn splits_shift_tokens_in_type_arguments() {
    let program = parse("let m: Map<string, Array<number>> = x;");
    let StmtKind::VarDecl { declarations, .. } = &program.statements[0].kind else {
        panic!("expected var decl");
    };
    let ty = declarations[0].type_ann.as_ref().expect("annotation");
    let TypeAnnKind::Ref { path, type_args } = &ty.kind else {
        panic!("expected type reference");
    };
    assert_eq!(path[0], "Map");
    assert_eq!(type_args.len(), 2);
}

#[test]
fn parses_conditional_and_mapped_types() {
    let program = parse(
        "type IsString<T> = T extends string ? true : false;\ntype P<T> = { [K in keyof T]?: T[K] };",
    );
    let StmtKind::TypeAlias(cond) = &program.statements[0].kind else {
        panic!("expected alias");
    };
    assert!(matches!(cond.ty.kind, TypeAnnKind::Conditional { .. }));
    let StmtKind::TypeAlias(mapped) = &program.statements[1].kind else {
        panic!("expected alias");
    };
    assert!(matches!(
        &mapped.ty.kind,
        TypeAnnKind::Mapped { optional: MappedModifier::Add, .. }
    ));
}

#[test]
fn parses_arrow_functions_and_assertions() {
    let program = parse("let f = (a: number, b = 2) => a + b;\nlet g = <string>x;\nlet h = y as number;");
    let StmtKind::VarDecl { declarations, .. } = &program.statements[0].kind else {
        panic!("expected var decl");
    };
    let Some(init) = &declarations[0].init else {
        panic!("initializer")
    };
    assert!(matches!(init.kind, ExprKind::Arrow { .. }));
    for stmt in &program.statements[1..] {
        let StmtKind::VarDecl { declarations, .. } = &stmt.kind else {
            panic!("expected var decl");
        };
        assert!(matches!(
            declarations[0].init.as_ref().unwrap().kind,
            ExprKind::TypeAssertion { .. }
        ));
    }
}

#[test]
fn parses_yield_and_await_forms() {
    let program = parse(
        "async function* g() { let a = yield 1; yield* inner(); let b = await p; }",
    );
    let StmtKind::Function(f) = &program.statements[0].kind else {
        panic!("expected function");
    };
    assert!(f.is_async && f.is_generator);
}

#[test]
fn parses_optional_chaining_and_nullish() {
    let program = parse("let v = a?.b?.[0] ?? fallback;");
    let StmtKind::VarDecl { declarations, .. } = &program.statements[0].kind else {
        panic!("expected var decl");
    };
    let init = declarations[0].init.as_ref().unwrap();
    assert!(matches!(
        &init.kind,
        ExprKind::Logical { op: LogicalOp::Nullish, .. }
    ));
}

#[test]
fn parses_enum_declarations() {
    let program = parse("enum D { Up, Down = 5 }\nconst enum C { A = 1 }");
    let StmtKind::Enum(d) = &program.statements[0].kind else {
        panic!("expected enum");
    };
    assert!(!d.is_const);
    assert_eq!(d.members.len(), 2);
    let StmtKind::Enum(c) = &program.statements[1].kind else {
        panic!("expected const enum");
    };
    assert!(c.is_const);
}
