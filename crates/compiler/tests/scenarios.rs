//! End-to-end scenarios: compile source, execute on the VM, compare
//! observable output.

use droe_core::schema::HttpMethod;
use droe_core::Artifact;
use droe_runtime::{CaptureHost, ErrorKind, HandlerResponse, Vm};
use droec::{compile_source, CompilerConfig, GeneratedOutput};
use std::path::PathBuf;

fn compile(source: &str) -> Artifact {
    let output = compile_source(source, &PathBuf::from("test.droe"), &CompilerConfig::new())
        .unwrap_or_else(|e| panic!("compile failed:\n{}", e.render()));
    match output.output {
        GeneratedOutput::Artifact(artifact) => artifact,
        GeneratedOutput::Text(_) => panic!("expected an artifact"),
    }
}

fn run(source: &str) -> String {
    let mut vm = Vm::new(compile(source));
    let mut host = CaptureHost::new();
    vm.init(&mut host)
        .unwrap_or_else(|e| panic!("runtime error: {}", e));
    host.output
}

fn run_expecting_error(source: &str) -> ErrorKind {
    let mut vm = Vm::new(compile(source));
    let mut host = CaptureHost::new();
    vm.init(&mut host).expect_err("expected a runtime error").kind
}

#[test]
fn scenario_hello_world() {
    assert_eq!(run("display \"Hello, World!\"\n"), "Hello, World!\n");
}

#[test]
fn scenario_while_loop() {
    let source = "\
set counter to 1
while counter is less than or equal to 3
  display counter
  set counter to counter plus 1
end while
";
    assert_eq!(run(source), "1\n2\n3\n");
}

#[test]
fn scenario_format_price() {
    let source = "\
set price which is decimal to 1234.56
display format price as \"#,##0.00\"
";
    assert_eq!(run(source), "1,234.56\n");
}

#[test]
fn scenario_action_call() {
    let source = "\
action add with a which is int, b which is int gives int
  give a plus b
end action
set s which is int from add with 10, 5
display s
";
    assert_eq!(run(source), "15\n");
}

#[test]
fn scenario_grade_ladder() {
    let source = "\
set score to 85
when score is greater than or equal to 90 then
  display \"Grade: A - Outstanding!\"
otherwise when score is greater than or equal to 80 then
  display \"Grade: B - Very Good!\"
  display \"Great work\"
otherwise
  display \"Keep practicing\"
end when
";
    assert_eq!(run(source), "Grade: B - Very Good!\nGreat work\n");
}

#[test]
fn scenario_endpoint_dispatch() {
    let source = "\
serve get /users/:id
  respond 200 with \"user-\" plus id
end serve
";
    let mut vm = Vm::new(compile(source));
    let mut host = CaptureHost::new();
    vm.init(&mut host).unwrap();
    let response = vm
        .invoke_path(HttpMethod::Get, "/users/42", "", &mut host)
        .unwrap();
    assert_eq!(
        response,
        HandlerResponse::Response {
            status: 200,
            body: "user-42".to_string()
        }
    );
}

// =========================================================================
// Boundary behaviors
// =========================================================================

#[test]
fn int_addition_overflow() {
    let source = "\
set big to 2147483647
set more to big plus 1
";
    assert_eq!(run_expecting_error(source), ErrorKind::Overflow);
}

#[test]
fn int_division_by_zero() {
    let source = "\
set zero to 0
display 1 divided by zero
";
    assert_eq!(run_expecting_error(source), ErrorKind::DivZero);
}

#[test]
fn decimal_division_by_zero() {
    let source = "\
set zero which is decimal to 0.00
display 1.50 divided by zero
";
    assert_eq!(run_expecting_error(source), ErrorKind::DivZero);
}

#[test]
fn decimal_multiplication_overflow() {
    let source = "\
set big which is decimal to 92233720368547758.07
display big times big
";
    assert_eq!(run_expecting_error(source), ErrorKind::Overflow);
}

#[test]
fn empty_collection_loops_zero_times() {
    let source = "\
set xs which are list of int to []
for each x in xs
  display x
end for
display \"done\"
";
    assert_eq!(run(source), "done\n");
}

#[test]
fn empty_collection_is_empty() {
    let source = "\
set xs which are list of int to []
when xs is empty then display \"empty\"
";
    assert_eq!(run(source), "empty\n");
}

#[test]
fn interpolation_keeps_trailing_decimal_zero() {
    let source = "\
set price which is decimal to 3.10
display \"price: [price]\"
";
    assert_eq!(run(source), "price: 3.10\n");
}

#[test]
fn decimal_scale_preserved_through_arithmetic() {
    // 1.50 * 2 = 3.00; 10.00 / 4.00 = 2.50
    let source = "\
set base which is decimal to 1.50
display base times 2
set total which is decimal to 10.00
display total divided by 4.00
";
    assert_eq!(run(source), "3.00\n2.50\n");
}

#[test]
fn when_chain_runs_at_most_one_block() {
    let source = "\
set n to 10
when n is greater than 5 then
  display \"first\"
otherwise when n is greater than 1 then
  display \"second\"
end when
";
    assert_eq!(run(source), "first\n");
}

#[test]
fn for_each_iterates_in_insertion_order() {
    let source = "\
set names which are list of text to [\"a\", \"b\", \"c\"]
for each name in names
  display name
end for
";
    assert_eq!(run(source), "a\nb\nc\n");
}

#[test]
fn for_each_over_text_visits_characters() {
    let source = "\
for each c in \"hi\"
  display c
end for
";
    assert_eq!(run(source), "h\ni\n");
}

#[test]
fn task_call_pushes_nothing() {
    let source = "\
task announce with msg which is text
  display msg
end task
announce with \"ready\"
display \"after\"
";
    assert_eq!(run(source), "ready\nafter\n");
}

#[test]
fn module_dispatch() {
    let source = "\
module math
  action double with n which is int gives int
    give n times 2
  end action
end module
set x which is int from math.double with 21
display x
";
    assert_eq!(run(source), "42\n");
}

#[test]
fn recursion_through_frame_stack() {
    let source = "\
action fact with n which is int gives int
  when n is less than or equal to 1 then
    give 1
  end when
  set m which is int from fact with n minus 1
  give n times m
end action
set r which is int from fact with 5
display r
";
    assert_eq!(run(source), "120\n");
}

#[test]
fn short_circuit_and_skips_rhs() {
    // The rhs would divide by zero; short-circuiting must skip it
    let source = "\
set zero to 0
set guard to false
when guard and 1 divided by zero equals 1 then
  display \"unreachable\"
end when
display \"safe\"
";
    assert_eq!(run(source), "safe\n");
}

#[test]
fn database_roundtrip_through_capture_host() {
    let source = "\
data User
  id is text key auto
  name is text required
end data
db create User with name is \"Ada\"
db create User with name is \"Grace\"
db find all User into users
for each u in users
  display u.name
end for
";
    assert_eq!(run(source), "Ada\nGrace\n");
}

#[test]
fn outbound_call_binds_response() {
    let source = "\
call \"https://api.example.com/ping\" method GET into reply
display reply.status
display reply.body
";
    let mut vm = Vm::new(compile(source));
    let mut host = CaptureHost::new().with_http(vec![droe_runtime::HttpResponse {
        status: 200,
        body: "pong".to_string(),
        headers: vec![],
    }]);
    vm.init(&mut host).unwrap();
    assert_eq!(host.output, "200\npong\n");
    assert_eq!(host.requests_seen.len(), 1);
    assert_eq!(host.requests_seen[0].0, "https://api.example.com/ping");
}

#[test]
fn unknown_endpoint_reported() {
    let source = "\
serve get /health
  respond 200 with \"ok\"
end serve
";
    let mut vm = Vm::new(compile(source));
    let mut host = CaptureHost::new();
    vm.init(&mut host).unwrap();
    let err = vm
        .invoke_path(HttpMethod::Get, "/missing", "", &mut host)
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::UnknownEndpoint);
}

#[test]
fn overlapping_endpoints_prefer_literal() {
    let source = "\
serve get /users/:id
  respond 200 with \"by-id\"
end serve
serve get /users/new
  respond 200 with \"form\"
end serve
";
    let mut vm = Vm::new(compile(source));
    let mut host = CaptureHost::new();
    vm.init(&mut host).unwrap();
    match vm
        .invoke_path(HttpMethod::Get, "/users/new", "", &mut host)
        .unwrap()
    {
        HandlerResponse::Response { body, .. } => assert_eq!(body, "form"),
        other => panic!("unexpected {:?}", other),
    }
    match vm
        .invoke_path(HttpMethod::Get, "/users/7", "", &mut host)
        .unwrap()
    {
        HandlerResponse::Response { body, .. } => assert_eq!(body, "by-id"),
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn request_body_reaches_handler() {
    let source = "\
serve post /echo
  respond 201 with request.body
end serve
";
    let mut vm = Vm::new(compile(source));
    let mut host = CaptureHost::new();
    vm.init(&mut host).unwrap();
    match vm
        .invoke_path(HttpMethod::Post, "/echo", "payload", &mut host)
        .unwrap()
    {
        HandlerResponse::Response { status, body } => {
            assert_eq!(status, 201);
            assert_eq!(body, "payload");
        }
        other => panic!("unexpected {:?}", other),
    }
}

// =========================================================================
// Artifact properties
// =========================================================================

#[test]
fn artifact_roundtrips_identically() {
    let artifact = compile("set x to 1\ndisplay x\n");
    let bytes = artifact.to_bytes().unwrap();
    let reloaded = Artifact::from_bytes(&bytes).unwrap();
    assert_eq!(bytes, reloaded.to_bytes().unwrap());
}

#[test]
fn compilation_is_idempotent_modulo_timestamp() {
    let source = "\
set price which is decimal to 19.99
display format price as \"$0.00\"
";
    let mut a = compile(source);
    let mut b = compile(source);
    a.metadata.created_at = 0;
    b.metadata.created_at = 0;
    assert_eq!(a.to_bytes().unwrap(), b.to_bytes().unwrap());
}

#[test]
fn reloaded_artifact_runs_identically() {
    let source = "\
set counter to 1
while counter is less than or equal to 3
  display counter
  set counter to counter plus 1
end while
";
    let artifact = compile(source);
    let direct = {
        let mut vm = Vm::new(artifact.clone());
        let mut host = CaptureHost::new();
        vm.init(&mut host).unwrap();
        host.output
    };
    let reloaded = Artifact::from_bytes(&artifact.to_bytes().unwrap()).unwrap();
    let via_disk = {
        let mut vm = Vm::new(reloaded);
        let mut host = CaptureHost::new();
        vm.init(&mut host).unwrap();
        host.output
    };
    assert_eq!(direct, via_disk);
}

#[test]
fn ui_trees_registered_as_records() {
    let source = "\
fragment Header
  slot title_area
    text \"default title\"
  end slot
end fragment
screen Home
  fragment Header
    slot title_area
      title \"Welcome\"
    end slot
  end fragment
  button \"Save\"
end screen
";
    let mut vm = Vm::new(compile(source));
    let mut host = CaptureHost::new();
    vm.init(&mut host).unwrap();
    assert!(vm
        .data_models()
        .iter()
        .any(|schema| schema.name == "ui_element"));
}
