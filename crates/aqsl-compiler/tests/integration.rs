//! End-to-end tests: build a shader tree, generate, check the SLX text.

use aqsl_common::{Opcode, ShaderClass, SlxProgram};
use aqsl_compiler::ast::{Ast, BinaryOp, Cone, NodeId, NodeKind, UnaryOp};
use aqsl_compiler::semantic::symbols::{FuncRef, FunctionDef, VarRef, VariableDef};
use aqsl_compiler::semantic::types::{BaseType, Type, TypeQualifiers};
use aqsl_compiler::{compile, CodeGenerator, CompilationSession, CompileError, GenContext, GenOptions, ShaderUnit};

// =========================================================================
// Fixtures
// =========================================================================

fn vfloat() -> Type {
    Type::varying(BaseType::Float)
}

fn ufloat() -> Type {
    Type::uniform(BaseType::Float)
}

fn vcolor() -> Type {
    Type::varying(BaseType::Color)
}

/// A shader under construction: the session owns the tree being built.
struct Shader {
    session: CompilationSession,
}

impl Shader {
    fn new() -> Self {
        Self {
            session: CompilationSession::new(Ast::new(), NodeId(0)),
        }
    }

    fn ast(&mut self) -> &mut Ast {
        &mut self.session.ast
    }

    fn std(&self, name: &str) -> VarRef {
        self.session.standard(name).expect("standard variable")
    }

    fn local(&mut self, name: &str, ty: Type) -> VarRef {
        self.session.add_variable(VariableDef::new(name, ty))
    }

    fn builtin(&mut self, def: FunctionDef) -> FuncRef {
        self.session.add_builtin(def)
    }

    /// `Ci = <value>` with the value cast to color.
    fn set_ci(&mut self, value: f32) -> NodeId {
        let ci = self.std("Ci");
        let ast = self.ast();
        let v = ast.float(value);
        let c = ast.cast(v, Type::uniform(BaseType::Color));
        ast.assign(ci, c)
    }

    /// `float name(float formal) { return formal * formal; }`
    fn square_fn(&mut self, name: &str, formal: &str) -> FuncRef {
        self.square_fn_of(name, formal, vfloat())
    }

    /// `ty name(ty formal) { return formal * formal; }`
    fn square_fn_of(&mut self, name: &str, formal: &str, ty: Type) -> FuncRef {
        let a = self.local(formal, ty);
        let ast = self.ast();
        let l = ast.var(a, ty);
        let r = ast.var(a, ty);
        let mul = ast.binary(BinaryOp::Mul, l, r, ty);
        let ret = ast.return_stmt(Some(mul));
        let body = ast.block(vec![ret]);
        self.session
            .add_function(FunctionDef::local(name, ty, vec![a], body))
    }

    fn finish(self, body: Vec<NodeId>) -> CompilationSession {
        self.finish_as(ShaderClass::Surface, vec![], body)
    }

    fn finish_as(
        mut self,
        class: ShaderClass,
        params: Vec<VarRef>,
        body: Vec<NodeId>,
    ) -> CompilationSession {
        let block = self.session.ast.block(body);
        let root = self.session.ast.shader(class, "test", params, block);
        self.session.set_root(root);
        self.session
    }
}

fn generate(session: &mut CompilationSession) -> (SlxProgram, GenContext) {
    let mut ctx = GenContext::new();
    let program = CodeGenerator::new(session, GenOptions::default())
        .generate(&mut ctx)
        .expect("generation failed");
    (program, ctx)
}

fn code_of(program: &SlxProgram) -> Vec<String> {
    program.code.iter().map(|l| l.to_string()).collect()
}

fn count(program: &SlxProgram, op: Opcode) -> usize {
    program.code_instructions().filter(|i| i.is(op)).count()
}

fn lines(expected: &[&str]) -> Vec<String> {
    expected.iter().map(|s| s.to_string()).collect()
}

// =========================================================================
// Conditionals
// =========================================================================

/// `float x = 1; if (x > 0) { Ci = 1; } else { Ci = 0; }`
#[test]
fn if_else_pushes_one_predicate_level() {
    let mut sh = Shader::new();
    let x = sh.local("x", vfloat());
    let one = sh.ast().float(1.0);
    let init = sh.ast().assign(x, one);
    let xr = sh.ast().var(x, vfloat());
    let zero = sh.ast().float(0.0);
    let cond = sh.ast().binary(BinaryOp::Gt, xr, zero, Type::varying(BaseType::Bool));
    let then = sh.set_ci(1.0);
    let otherwise = sh.set_ci(0.0);
    let if_stmt = sh.ast().if_else(cond, then, Some(otherwise));
    let mut session = sh.finish(vec![init, if_stmt]);

    let (program, ctx) = generate(&mut session);
    assert_eq!(
        code_of(&program),
        lines(&[
            "\tpushif 1",
            "\tpop x",
            "\tS_CLEAR",
            "\tpushv x",
            "\tpushif 0",
            "\tgtff",
            "\tS_GET",
            "\tRS_PUSH",
            "\tRS_GET",
            "\tRS_JZ 0",
            "\tpushif 1",
            "\tsetfc",
            "\tpop Ci",
            ":0",
            "\tRS_INVERSE",
            "\tRS_JZ 1",
            "\tpushif 0",
            "\tsetfc",
            "\tpop Ci",
            ":1",
            "\tRS_POP",
        ])
    );
    assert_eq!(count(&program, Opcode::RsPush), 1);
    assert_eq!(count(&program, Opcode::RsPop), 1);
    assert!(ctx.is_quiescent());
}

#[test]
fn ternary_merges_by_true_branch_type() {
    let mut sh = Shader::new();
    let (u, cs, os, ci) = (sh.std("u"), sh.std("Cs"), sh.std("Os"), sh.std("Ci"));
    let ast = sh.ast();
    let ur = ast.var(u, vfloat());
    let half = ast.float(0.5);
    let cond = ast.binary(BinaryOp::Gt, ur, half, Type::varying(BaseType::Bool));
    let a = ast.var(cs, vcolor());
    let b = ast.var(os, vcolor());
    let pick = ast.ternary(cond, a, b, vcolor());
    let stmt = ast.assign(ci, pick);
    let mut session = sh.finish(vec![stmt]);

    let (program, _) = generate(&mut session);
    assert_eq!(
        code_of(&program),
        lines(&[
            "\tS_CLEAR",
            "\tpushv u",
            "\tpushif 0.5",
            "\tgtff",
            "\tdup",
            "\tS_GET",
            "\tRS_PUSH",
            "\tRS_GET",
            "\tpushv Cs",
            "\tRS_INVERSE",
            "\tpushv Os",
            "\tRS_POP",
            "\tmergec",
            "\tpop Ci",
        ])
    );
}

// =========================================================================
// Loops
// =========================================================================

fn less_than(sh: &mut Shader, var: VarRef, limit: f32) -> NodeId {
    let ast = sh.ast();
    let r = ast.var(var, ufloat());
    let l = ast.float(limit);
    ast.binary(BinaryOp::Lt, r, l, Type::uniform(BaseType::Bool))
}

fn increment(sh: &mut Shader, var: VarRef) -> NodeId {
    let ast = sh.ast();
    let r = ast.var(var, ufloat());
    let one = ast.float(1.0);
    let sum = ast.binary(BinaryOp::Add, r, one, ufloat());
    ast.assign(var, sum)
}

#[test]
fn while_loop_layout() {
    let mut sh = Shader::new();
    let i = sh.local("i", ufloat());
    let cond = less_than(&mut sh, i, 4.0);
    let body_stmt = sh.set_ci(1.0);
    let body = sh.ast().block(vec![body_stmt]);
    let step = increment(&mut sh, i);
    let lp = sh.ast().while_loop(cond, body, Some(step));
    let mut session = sh.finish(vec![lp]);

    let (program, ctx) = generate(&mut session);
    assert_eq!(
        code_of(&program),
        lines(&[
            "\tRS_PUSH",
            ":0",
            "\tS_CLEAR",
            "\tpushv i",
            "\tpushif 4",
            "\tlsff",
            "\tS_GET",
            "\tS_JZ 1",
            "\tRS_GET",
            "\tRS_PUSH",
            "\tpushif 1",
            "\tsetfc",
            "\tpop Ci",
            "\tRS_POP",
            "\tpushv i",
            "\tpushif 1",
            "\taddff",
            "\tpop i",
            "\tjmp 0",
            ":1",
            "\tRS_POP",
        ])
    );
    assert!(ctx.is_quiescent());
}

/// `while { illuminance (P) { break 2; } }`: the while loop has pushed two
/// levels and the illuminance loop one when the break is reached.
#[test]
fn break_two_sums_both_constructs() {
    for (stmt, expected) in [("break", "\tRS_BREAK 3"), ("continue", "\tRS_BREAK 0")] {
        let mut sh = Shader::new();
        let i = sh.local("i", ufloat());
        let p = sh.std("P");
        let exit = match stmt {
            "break" => sh.ast().break_stmt(Some(2)),
            _ => sh.ast().continue_stmt(None),
        };
        let light_body = sh.ast().block(vec![exit]);
        let position = sh.ast().var(p, Type::varying(BaseType::Point));
        let illum = sh.ast().stmt(NodeKind::Illuminance {
            category: None,
            position,
            cone: None,
            body: light_body,
        });
        let loop_body = sh.ast().block(vec![illum]);
        let cond = less_than(&mut sh, i, 2.0);
        let lp = sh.ast().while_loop(cond, loop_body, None);
        let mut session = sh.finish(vec![lp]);

        let (program, ctx) = generate(&mut session);
        let code = code_of(&program);
        assert!(code.contains(&expected.to_string()), "{}: {:?}", stmt, code);
        assert!(ctx.diagnostics().is_empty());
    }
}

#[test]
fn break_and_continue_in_nested_while_loops() {
    let mut sh = Shader::new();
    let i = sh.local("i", ufloat());
    let j = sh.local("j", ufloat());
    let brk = sh.ast().break_stmt(Some(2));
    let cont = sh.ast().continue_stmt(None);
    let inner_body = sh.ast().block(vec![brk, cont]);
    let inner_cond = less_than(&mut sh, j, 3.0);
    let inner = sh.ast().while_loop(inner_cond, inner_body, None);
    let outer_body = sh.ast().block(vec![inner]);
    let outer_cond = less_than(&mut sh, i, 3.0);
    let outer = sh.ast().while_loop(outer_cond, outer_body, None);
    let mut session = sh.finish(vec![outer]);

    let (program, _) = generate(&mut session);
    let breaks: Vec<String> = program
        .code_instructions()
        .filter(|i| i.is(Opcode::RsBreak))
        .map(|i| i.to_string())
        .collect();
    assert_eq!(breaks, lines(&["RS_BREAK 4", "RS_BREAK 1"]));
}

#[test]
fn break_deeper_than_open_loops_is_an_error() {
    let mut sh = Shader::new();
    let i = sh.local("i", ufloat());
    let j = sh.local("j", ufloat());
    let brk = sh.ast().break_stmt(Some(5));
    let inner_body = sh.ast().block(vec![brk]);
    let inner_cond = less_than(&mut sh, j, 3.0);
    let inner = sh.ast().while_loop(inner_cond, inner_body, None);
    let outer_body = sh.ast().block(vec![inner]);
    let outer_cond = less_than(&mut sh, i, 3.0);
    let outer = sh.ast().while_loop(outer_cond, outer_body, None);
    let mut session = sh.finish(vec![outer]);

    let compiled = compile(&mut session, &GenOptions::default()).expect("compiles best-effort");
    assert!(compiled.has_errors());
    assert_eq!(compiled.diagnostics.error_count(), 1);
    assert_eq!(count(&compiled.program, Opcode::RsBreak), 0);
    assert_eq!(count(&compiled.program, Opcode::Invalid), 1);
}

#[test]
fn nested_constructs_keep_the_predicate_stack_balanced() {
    let mut sh = Shader::new();
    let i = sh.local("i", ufloat());
    let (u, p, n) = (sh.std("u"), sh.std("P"), sh.std("N"));

    let ci_a = sh.set_ci(0.25);
    let ci_b = sh.set_ci(0.75);
    let ur = sh.ast().var(u, vfloat());
    let half = sh.ast().float(0.5);
    let cond = sh.ast().binary(BinaryOp::Ge, ur, half, Type::varying(BaseType::Bool));
    let inner_if = sh.ast().if_else(cond, ci_a, Some(ci_b));
    let cont = sh.ast().continue_stmt(None);

    let position = sh.ast().var(p, Type::varying(BaseType::Point));
    let axis = sh.ast().var(n, Type::varying(BaseType::Normal));
    let angle = sh.ast().float(1.57);
    let light_body = sh.ast().block(vec![inner_if, cont]);
    let illum = sh.ast().stmt(NodeKind::Illuminance {
        category: None,
        position,
        cone: Some(Cone { axis, angle }),
        body: light_body,
    });

    let brk = sh.ast().break_stmt(None);
    let loop_body = sh.ast().block(vec![illum, brk]);
    let cond = less_than(&mut sh, i, 8.0);
    let step = increment(&mut sh, i);
    let lp = sh.ast().while_loop(cond, loop_body, Some(step));
    let mut session = sh.finish(vec![lp]);

    let (program, ctx) = generate(&mut session);
    assert_eq!(
        count(&program, Opcode::RsPush),
        count(&program, Opcode::RsPop)
    );
    assert_eq!(count(&program, Opcode::RsPush), 4);
    assert_eq!(count(&program, Opcode::Illuminance2), 1);
    assert!(ctx.is_quiescent());
    assert!(ctx.diagnostics().is_empty());
}

// =========================================================================
// Light constructs
// =========================================================================

#[test]
fn illuminance_defaults_category_to_empty_string() {
    let mut sh = Shader::new();
    let (p, cl, ci) = (sh.std("P"), sh.std("Cl"), sh.std("Ci"));
    let position = sh.ast().var(p, Type::varying(BaseType::Point));
    let light = sh.ast().var(cl, vcolor());
    let acc = sh.ast().assign(ci, light);
    let body = sh.ast().block(vec![acc]);
    let illum = sh.ast().stmt(NodeKind::Illuminance {
        category: None,
        position,
        cone: None,
        body,
    });
    let mut session = sh.finish(vec![illum]);

    let (program, _) = generate(&mut session);
    assert_eq!(
        code_of(&program),
        lines(&[
            "\tinit_illuminance",
            "\tjz 1",
            ":0",
            "\tS_CLEAR",
            "\tpushv P",
            "\tpushis \"\"",
            "\tilluminance",
            "\tS_GET",
            "\tRS_PUSH",
            "\tRS_GET",
            "\tRS_JZ 2",
            "\tpushv Cl",
            "\tpop Ci",
            ":2",
            "\tRS_POP",
            "\tadvance_illuminance",
            "\tjnz 0",
            ":1",
        ])
    );
}

#[test]
fn illuminate_with_cone_and_plain_solar() {
    let mut sh = Shader::new();
    let (p, n, cl) = (sh.std("P"), sh.std("N"), sh.std("Cl"));
    let position = sh.ast().var(p, Type::varying(BaseType::Point));
    let axis = sh.ast().var(n, Type::varying(BaseType::Normal));
    let angle = sh.ast().float(0.5);
    let one = sh.ast().float(1.0);
    let c = sh.ast().cast(one, Type::uniform(BaseType::Color));
    let set_cl = sh.ast().assign(cl, c);
    let body = sh.ast().block(vec![set_cl]);
    let lit = sh.ast().stmt(NodeKind::Illuminate {
        position,
        cone: Some(Cone { axis, angle }),
        body,
    });
    let empty = sh.ast().block(vec![]);
    let solar = sh.ast().stmt(NodeKind::Solar {
        cone: None,
        body: empty,
    });
    let mut session = sh.finish_as(ShaderClass::Light, vec![], vec![lit, solar]);

    let (program, ctx) = generate(&mut session);
    assert_eq!(
        code_of(&program),
        lines(&[
            "\tS_CLEAR",
            "\tpushif 0.5",
            "\tpushv N",
            "\tpushv P",
            "\tilluminate2",
            "\tS_GET",
            "\tRS_PUSH",
            "\tRS_GET",
            "\tRS_JZ 0",
            "\tpushif 1",
            "\tsetfc",
            "\tpop Cl",
            ":0",
            "\tRS_POP",
            "\tS_CLEAR",
            "\tsolar",
            "\tS_GET",
            "\tRS_PUSH",
            "\tRS_GET",
            "\tRS_JZ 1",
            ":1",
            "\tRS_POP",
        ])
    );
    assert!(program.to_string().starts_with("light\n"));
    assert!(ctx.is_quiescent());
}

#[test]
fn gather_pushes_extra_argument_count_and_runs_else_on_misses() {
    let mut sh = Shader::new();
    let (p, n, ci) = (sh.std("P"), sh.std("N"), sh.std("Ci"));
    let hit_color = sh.local("hitc", vcolor());
    let category = sh.ast().string("illuminance");
    let position = sh.ast().var(p, Type::varying(BaseType::Point));
    let dir = sh.ast().var(n, Type::varying(BaseType::Normal));
    let angle = sh.ast().float(0.3);
    let samples = sh.ast().float(16.0);
    let label = sh.ast().string("surface:Ci");
    let out = sh.ast().var(hit_color, vcolor());
    let hit_read = sh.ast().var(hit_color, vcolor());
    let hit = sh.ast().assign(ci, hit_read);
    let miss = sh.set_ci(0.0);
    let gather = sh.ast().stmt(NodeKind::Gather {
        args: vec![category, position, dir, angle, samples, label, out],
        body: hit,
        otherwise: Some(miss),
    });
    let mut session = sh.finish(vec![gather]);

    let (program, ctx) = generate(&mut session);
    assert_eq!(
        code_of(&program),
        lines(&[
            "\tpushv hitc",
            "\tpushis \"surface:Ci\"",
            "\tpushif 16",
            "\tpushif 0.3",
            "\tpushv N",
            "\tpushv P",
            "\tpushis \"illuminance\"",
            "\tpushif 2",
            "\tinit_gather",
            "\tjz 1",
            ":0",
            "\tS_CLEAR",
            "\tgather",
            "\tS_GET",
            "\tRS_PUSH",
            "\tRS_GET",
            "\tpushv hitc",
            "\tpop Ci",
            "\tRS_INVERSE",
            "\tpushif 0",
            "\tsetfc",
            "\tpop Ci",
            "\tRS_POP",
            "\tadvance_gather",
            "\tjnz 0",
            ":1",
        ])
    );
    assert!(ctx.is_quiescent());
}

// =========================================================================
// Calls and inlining
// =========================================================================

/// `float sq(float a) { return a*a; }` called as `y = sq(x+1); x = sq(y);`
#[test]
fn computed_argument_goes_through_a_temp() {
    let mut sh = Shader::new();
    let x = sh.local("x", vfloat());
    let y = sh.local("y", vfloat());
    let sq = sh.square_fn("sq", "a");

    let xr = sh.ast().var(x, vfloat());
    let one = sh.ast().float(1.0);
    let sum = sh.ast().binary(BinaryOp::Add, xr, one, vfloat());
    let call = sh.ast().call(sq, vec![sum], vfloat());
    let first = sh.ast().assign(y, call);

    let yr = sh.ast().var(y, vfloat());
    let call2 = sh.ast().call(sq, vec![yr], vfloat());
    let second = sh.ast().assign(x, call2);
    let mut session = sh.finish(vec![first, second]);

    let (program, ctx) = generate(&mut session);
    assert_eq!(
        code_of(&program),
        lines(&[
            "\tpushv x",
            "\tpushif 1",
            "\taddff",
            "\tpop _1$a",
            "\tpushv _1$a",
            "\tpushv _1$a",
            "\tmulff",
            "\tpop y",
            "\tpushv y",
            "\tpushv y",
            "\tmulff",
            "\tpop x",
        ])
    );
    assert!(ctx.translations.is_empty());
    assert!(ctx.temps.is_empty());
    assert!(ctx.is_quiescent());

    let data: Vec<String> = program.data.iter().map(|d| d.to_string()).collect();
    assert_eq!(
        data,
        lines(&["varying float x", "varying float y", "varying float _1$a"])
    );
    assert_eq!(session.functions[sq.index].internal_usage, 2);
}

#[test]
fn nested_inlining_uses_disjoint_temps() {
    let mut sh = Shader::new();
    let x = sh.local("x", vfloat());
    let y = sh.local("y", vfloat());
    let sq = sh.square_fn("sq", "a");

    // float outer(float a) { return sq(a + 2); }
    let a = sh.local("a", vfloat());
    let ar = sh.ast().var(a, vfloat());
    let two = sh.ast().float(2.0);
    let sum = sh.ast().binary(BinaryOp::Add, ar, two, vfloat());
    let inner_call = sh.ast().call(sq, vec![sum], vfloat());
    let ret = sh.ast().return_stmt(Some(inner_call));
    let body = sh.ast().block(vec![ret]);
    let outer = sh
        .session
        .add_function(FunctionDef::local("outer", vfloat(), vec![a], body));

    let xr = sh.ast().var(x, vfloat());
    let neg = sh.ast().unary(UnaryOp::Neg, xr, vfloat());
    let call = sh.ast().call(outer, vec![neg], vfloat());
    let stmt = sh.ast().assign(y, call);
    let mut session = sh.finish(vec![stmt]);

    let (program, ctx) = generate(&mut session);
    assert_eq!(
        code_of(&program),
        lines(&[
            "\tpushv x",
            "\tneg",
            "\tpop _1$a",
            "\tpushv _1$a",
            "\tpushif 2",
            "\taddff",
            "\tpop _2$a",
            "\tpushv _2$a",
            "\tpushv _2$a",
            "\tmulff",
            "\tpop y",
        ])
    );
    assert!(ctx.is_quiescent());
}

/// `float g(float u; float a) { return u + a; }`
/// `float f(float a) { return g(a, x * 2); }`
/// `y = f(x + 1);`
#[test]
fn inner_formal_with_the_same_name_does_not_capture_outer_temp() {
    let mut sh = Shader::new();
    let x = sh.local("x", vfloat());
    let y = sh.local("y", vfloat());

    let g_u = sh.local("u", vfloat());
    let g_a = sh.local("a", vfloat());
    let ur = sh.ast().var(g_u, vfloat());
    let ar = sh.ast().var(g_a, vfloat());
    let sum = sh.ast().binary(BinaryOp::Add, ur, ar, vfloat());
    let ret = sh.ast().return_stmt(Some(sum));
    let body = sh.ast().block(vec![ret]);
    let g = sh
        .session
        .add_function(FunctionDef::local("g", vfloat(), vec![g_u, g_a], body));

    let f_a = sh.local("a", vfloat());
    let f_ar = sh.ast().var(f_a, vfloat());
    let xr = sh.ast().var(x, vfloat());
    let two = sh.ast().float(2.0);
    let doubled = sh.ast().binary(BinaryOp::Mul, xr, two, vfloat());
    let inner_call = sh.ast().call(g, vec![f_ar, doubled], vfloat());
    let ret = sh.ast().return_stmt(Some(inner_call));
    let body = sh.ast().block(vec![ret]);
    let f = sh
        .session
        .add_function(FunctionDef::local("f", vfloat(), vec![f_a], body));

    let xr = sh.ast().var(x, vfloat());
    let one = sh.ast().float(1.0);
    let plus_one = sh.ast().binary(BinaryOp::Add, xr, one, vfloat());
    let call = sh.ast().call(f, vec![plus_one], vfloat());
    let stmt = sh.ast().assign(y, call);
    let mut session = sh.finish(vec![stmt]);

    let (program, ctx) = generate(&mut session);
    assert_eq!(
        code_of(&program),
        lines(&[
            "\tpushv x",
            "\tpushif 1",
            "\taddff",
            "\tpop _1$a",
            "\tpushv x",
            "\tpushif 2",
            "\tmulff",
            "\tpop _2$a",
            "\tpushv _1$a",
            "\tpushv _2$a",
            "\taddff",
            "\tpop y",
        ])
    );
    assert!(ctx.is_quiescent());
}

/// `float sq(float a)` and `color tint(color a)` both square their formal:
/// `y = sq(x + 1); Ci = tint(Cs * Cs); x = sq(y + 1);`
#[test]
fn same_named_formals_of_different_types_get_separate_temps() {
    let mut sh = Shader::new();
    let x = sh.local("x", vfloat());
    let y = sh.local("y", vfloat());
    let (cs, ci) = (sh.std("Cs"), sh.std("Ci"));
    let sq = sh.square_fn("sq", "a");
    let tint = sh.square_fn_of("tint", "a", vcolor());
    let tint_formal = session_formal(&sh, tint);

    let xr = sh.ast().var(x, vfloat());
    let one = sh.ast().float(1.0);
    let sum = sh.ast().binary(BinaryOp::Add, xr, one, vfloat());
    let call = sh.ast().call(sq, vec![sum], vfloat());
    let first = sh.ast().assign(y, call);

    let l = sh.ast().var(cs, vcolor());
    let r = sh.ast().var(cs, vcolor());
    let product = sh.ast().binary(BinaryOp::Mul, l, r, vcolor());
    let call = sh.ast().call(tint, vec![product], vcolor());
    let second = sh.ast().assign(ci, call);

    let yr = sh.ast().var(y, vfloat());
    let one = sh.ast().float(1.0);
    let sum = sh.ast().binary(BinaryOp::Add, yr, one, vfloat());
    let call = sh.ast().call(sq, vec![sum], vfloat());
    let third = sh.ast().assign(x, call);
    let mut session = sh.finish(vec![first, second, third]);

    let (program, _) = generate(&mut session);
    let color_temp = format!("_1$a${}", tint_formal.index);
    assert_eq!(
        code_of(&program),
        lines(&[
            "\tpushv x",
            "\tpushif 1",
            "\taddff",
            "\tpop _1$a",
            "\tpushv _1$a",
            "\tpushv _1$a",
            "\tmulff",
            "\tpop y",
            "\tpushv Cs",
            "\tpushv Cs",
            "\tmulcc",
            &format!("\tpop {}", color_temp),
            &format!("\tpushv {}", color_temp),
            &format!("\tpushv {}", color_temp),
            "\tmulcc",
            "\tpop Ci",
            "\tpushv y",
            "\tpushif 1",
            "\taddff",
            "\tpop _1$a",
            "\tpushv _1$a",
            "\tpushv _1$a",
            "\tmulff",
            "\tpop x",
        ])
    );

    let data: Vec<String> = program.data.iter().map(|d| d.to_string()).collect();
    assert_eq!(
        data,
        vec![
            "varying float x".to_string(),
            "varying float y".to_string(),
            "varying float _1$a".to_string(),
            format!("varying color {}", color_temp),
        ]
    );
}

fn session_formal(sh: &Shader, func: FuncRef) -> VarRef {
    sh.session.functions[func.index].formals[0]
}

#[test]
fn bare_argument_chains_resolve_to_the_outermost_variable() {
    let mut sh = Shader::new();
    let x = sh.local("x", vfloat());
    let y = sh.local("y", vfloat());
    let sq = sh.square_fn("sq", "a");

    // float wrap(float b) { return sq(b); }
    let b = sh.local("b", vfloat());
    let br = sh.ast().var(b, vfloat());
    let inner_call = sh.ast().call(sq, vec![br], vfloat());
    let ret = sh.ast().return_stmt(Some(inner_call));
    let body = sh.ast().block(vec![ret]);
    let wrap = sh
        .session
        .add_function(FunctionDef::local("wrap", vfloat(), vec![b], body));

    let xr = sh.ast().var(x, vfloat());
    let call = sh.ast().call(wrap, vec![xr], vfloat());
    let stmt = sh.ast().assign(y, call);
    let mut session = sh.finish(vec![stmt]);

    let (program, _) = generate(&mut session);
    assert_eq!(
        code_of(&program),
        lines(&["\tpushv x", "\tpushv x", "\tmulff", "\tpop y"])
    );
}

#[test]
fn output_formal_writes_back_to_the_actual() {
    let mut sh = Shader::new();
    let x = sh.local("x", vfloat());

    // void zero(output float r) { r = 0; }
    let r = sh.local("r", vfloat().with(TypeQualifiers::OUTPUT));
    let zero = sh.ast().float(0.0);
    let assign = sh.ast().assign(r, zero);
    let body = sh.ast().block(vec![assign]);
    let f = sh
        .session
        .add_function(FunctionDef::local("zero", Type::VOID, vec![r], body));

    let xr = sh.ast().var(x, vfloat());
    let call = sh.ast().call(f, vec![xr], Type::VOID);
    let stmt = sh.ast().expr_stmt(call);
    let mut session = sh.finish(vec![stmt]);

    let (program, _) = generate(&mut session);
    assert_eq!(code_of(&program), lines(&["\tpushif 0", "\tpop x"]));
}

#[test]
fn recursive_local_call_is_rejected_and_stacks_unwind() {
    let mut sh = Shader::new();
    let a = sh.local("a", vfloat());
    // float loop(float a) { return loop(a); } with the FuncRef known ahead.
    let self_ref = FuncRef::local(0);
    let ar = sh.ast().var(a, vfloat());
    let call = sh.ast().call(self_ref, vec![ar], vfloat());
    let ret = sh.ast().return_stmt(Some(call));
    let body = sh.ast().block(vec![ret]);
    let f = sh
        .session
        .add_function(FunctionDef::local("loop", vfloat(), vec![a], body));
    assert_eq!(f, self_ref);

    let y = sh.local("y", vfloat());
    let one = sh.ast().float(1.0);
    let outer_call = sh.ast().call(f, vec![one], vfloat());
    let stmt = sh.ast().assign(y, outer_call);
    let mut session = sh.finish(vec![stmt]);

    let mut ctx = GenContext::new();
    let err = CodeGenerator::new(&mut session, GenOptions::default())
        .generate(&mut ctx)
        .unwrap_err();
    assert!(matches!(err, CompileError::RecursiveInline(ref name) if name == "loop"));
    assert!(ctx.translations.is_empty());
    assert!(ctx.temps.is_empty());
    assert_eq!(ctx.inline_depth(), 0);
}

#[test]
fn builtin_calls_push_arguments_in_reverse() {
    let mut sh = Shader::new();
    let (s, t, ci) = (sh.std("s"), sh.std("t"), sh.std("Ci"));
    let texture = sh.builtin(FunctionDef::builtin("texture", vcolor(), "sff"));
    let name = sh.ast().string("grid.tx");
    let sr = sh.ast().var(s, vfloat());
    let tr = sh.ast().var(t, vfloat());
    let call = sh.ast().call(texture, vec![name, sr, tr], vcolor());
    let stmt = sh.ast().assign(ci, call);
    let mut session = sh.finish(vec![stmt]);

    let (program, _) = generate(&mut session);
    assert_eq!(
        code_of(&program),
        lines(&[
            "\tpushv t",
            "\tpushv s",
            "\tpushis \"grid.tx\"",
            "\ttexture",
            "\tpop Ci",
        ])
    );
    assert_eq!(session.builtins[texture.index].internal_usage, 1);
}

#[test]
fn variadic_builtin_pushes_extra_count_and_void_result_is_not_dropped() {
    let mut sh = Shader::new();
    let (u, v) = (sh.std("u"), sh.std("v"));
    let printf = sh.builtin(FunctionDef::builtin("printf", Type::VOID, "s").variadic(1));
    let sqrt = sh.builtin(FunctionDef::builtin("sqrt", vfloat(), "f"));
    let fmt = sh.ast().string("%f %f\n");
    let ur = sh.ast().var(u, vfloat());
    let vr = sh.ast().var(v, vfloat());
    let call = sh.ast().call(printf, vec![fmt, ur, vr], Type::VOID);
    let print_stmt = sh.ast().expr_stmt(call);
    let two = sh.ast().float(2.0);
    let root = sh.ast().call(sqrt, vec![two], vfloat());
    let discard = sh.ast().expr_stmt(root);
    let mut session = sh.finish(vec![print_stmt, discard]);

    let (program, _) = generate(&mut session);
    assert_eq!(
        code_of(&program),
        lines(&[
            "\tpushv v",
            "\tpushv u",
            "\tpushis \"%f %f\\n\"",
            "\tpushif 2",
            "\tprintf",
            "\tpushif 2",
            "\tsqrt",
            "\tdrop",
        ])
    );
}

#[test]
fn external_function_is_declared_for_late_binding() {
    let mut sh = Shader::new();
    let (p, s) = (sh.std("P"), sh.std("s"));
    let noise = sh.builtin(FunctionDef::external("noise4", vfloat(), "pf"));
    let pr = sh.ast().var(p, Type::varying(BaseType::Point));
    let time = sh.ast().float(0.5);
    let call = sh.ast().call(noise, vec![pr, time], vfloat());
    let stmt = sh.ast().assign(s, call);
    let mut session = sh.finish(vec![stmt]);

    let (program, _) = generate(&mut session);
    assert_eq!(
        code_of(&program),
        lines(&[
            "\tpushif 0.5",
            "\tpushv P",
            "\texternal \"noise4\" \"f\" \"pf\"",
            "\tpop s",
        ])
    );
}

// =========================================================================
// Output segments
// =========================================================================

#[test]
fn full_program_text() {
    let mut sh = Shader::new();
    let kd = sh.session.add_variable(VariableDef::new(
        "Kd",
        Type::uniform(BaseType::Float).with(TypeQualifiers::PARAM),
    ));
    let default = sh.ast().float(0.5);
    sh.session.variables.get_mut(kd.index).expect("Kd").initializer = Some(default);
    sh.local("scratch", vfloat());

    let (cs, ci) = (sh.std("Cs"), sh.std("Ci"));
    let kd_r = sh.ast().var(kd, ufloat());
    let cs_r = sh.ast().var(cs, vcolor());
    let mul = sh.ast().binary(BinaryOp::Mul, kd_r, cs_r, vcolor());
    let stmt = sh.ast().assign(ci, mul);
    let mut session = sh.finish_as(ShaderClass::Surface, vec![kd], vec![stmt]);

    let compiled = compile(&mut session, &GenOptions::default()).unwrap();
    assert!(compiled.diagnostics.is_empty());
    let uses = (1 << 0) | (1 << 17);
    assert_eq!(
        compiled.program.to_string(),
        format!(
            "surface\nAQSIS_V 1.8.2\n\nsegment Data\nUSES {}\n\nparam uniform float Kd\n\
             segment Init\n\tpushif 0.5\n\tpop Kd\n\
             segment Code\n\tpushv Kd\n\tpushv Cs\n\tmulfc\n\tpop Ci\n",
            uses
        )
    );
}

#[test]
fn uses_counts_upstream_standard_uses() {
    let mut sh = Shader::new();
    sh.session.mark_standard_used("N");
    let mut session = sh.finish(vec![]);
    let (program, _) = generate(&mut session);
    assert_eq!(program.uses, 1 << 11);
    assert!(program.code.is_empty());
}

// =========================================================================
// Pipeline properties
// =========================================================================

fn sample_unit() -> ShaderUnit {
    let mut sh = Shader::new();
    let x = sh.local("x", vfloat());
    let y = sh.local("y", vfloat());
    let sq = sh.square_fn("sq", "a");
    let xr = sh.ast().var(x, vfloat());
    let one = sh.ast().float(1.0);
    let sum = sh.ast().binary(BinaryOp::Add, xr, one, vfloat());
    let call = sh.ast().call(sq, vec![sum], vfloat());
    let stmt = sh.ast().assign(y, call);
    let cond = less_than(&mut sh, y, 1.0);
    let brk = sh.ast().break_stmt(None);
    let lp = sh.ast().while_loop(cond, brk, None);
    let session = sh.finish(vec![stmt, lp]);

    ShaderUnit {
        ast: session.ast.clone(),
        root: session.root,
        variables: session.variables.iter().cloned().collect(),
        builtins: session.builtins.iter().cloned().collect(),
        functions: session.functions.iter().cloned().collect(),
        standard_uses: vec![],
        source_file: Some("sample.sl".to_string()),
    }
}

#[test]
fn compiling_twice_is_byte_identical() {
    let render = || {
        let mut session = CompilationSession::from_unit(sample_unit());
        compile(&mut session, &GenOptions::default())
            .unwrap()
            .program
            .to_string()
    };
    assert_eq!(render(), render());
}

#[test]
fn unit_survives_json_and_compiles_the_same() {
    let direct = {
        let mut session = CompilationSession::from_unit(sample_unit());
        compile(&mut session, &GenOptions::default()).unwrap().program.to_string()
    };
    let json = serde_json::to_string(&sample_unit()).unwrap();
    let unit: ShaderUnit = serde_json::from_str(&json).unwrap();
    let mut session = CompilationSession::from_unit(unit);
    let via_json = compile(&mut session, &GenOptions::default()).unwrap().program.to_string();
    assert_eq!(direct, via_json);
}

#[test]
fn unresolved_reference_aborts_the_shader() {
    let mut sh = Shader::new();
    let ghost = VarRef::local(99);
    let read = sh.ast().var(ghost, vfloat());
    let ci = sh.std("Ci");
    let stmt = sh.ast().assign(ci, read);
    let mut session = sh.finish(vec![stmt]);

    let err = compile(&mut session, &GenOptions::default()).unwrap_err();
    match err {
        CompileError::InvalidReferences(diags) => assert_eq!(diags.len(), 1),
        other => panic!("unexpected error: {}", other),
    }
}
