//! Endpoint invocation against a hand-assembled artifact: the runtime
//! must serve handlers from any conforming artifact, not only ones the
//! bundled compiler emitted.

use droe_core::constant::Constant;
use droe_core::instruction::{HostFn, Instruction};
use droe_core::schema::{EndpointEntry, FieldSchema, HttpMethod, RecordSchema, TypeTag};
use droe_core::{Artifact, Metadata};
use droe_runtime::{CaptureHost, ErrorKind, HandlerResponse, Vm};

/// serve get /users/:id { respond 200 with "user-" plus id }
fn users_artifact() -> Artifact {
    Artifact {
        metadata: Metadata {
            source_file: "handlers.droe".to_string(),
            compiler_version: "test".to_string(),
            created_at: 0,
        },
        constants: vec![
            Constant::Text("user-".to_string()),
            Constant::Int(200),
        ],
        record_schemas: vec![RecordSchema {
            name: "request$0".to_string(),
            fields: vec![
                FieldSchema {
                    name: "id".to_string(),
                    ty: TypeTag::Text,
                    annotations: vec![],
                },
                FieldSchema {
                    name: "body".to_string(),
                    ty: TypeTag::Text,
                    annotations: vec![],
                },
            ],
        }],
        modules: vec![],
        endpoints: vec![EndpointEntry {
            method: HttpMethod::Get,
            path_template: "/users/:id".to_string(),
            path_params: vec!["id".to_string()],
            handler_entry: 3,
        }],
        instructions: vec![
            // Startup prologue
            Instruction::DefineData(0),
            Instruction::DefineEndpoint(0),
            Instruction::Halt,
            // Handler: respond 200 with "user-" plus request.id
            Instruction::EnterFrame(1),
            Instruction::PushConst(1),
            Instruction::PushConst(0),
            Instruction::LoadLocal(0),
            Instruction::GetField(0),
            Instruction::Concat,
            Instruction::HostCall {
                func: HostFn::Respond,
                args: 2,
            },
            Instruction::EndHandler,
        ],
    }
}

#[test]
fn test_invoke_binds_path_params() {
    let mut vm = Vm::new(users_artifact());
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

#[test]
fn test_each_invocation_sees_fresh_request() {
    let mut vm = Vm::new(users_artifact());
    let mut host = CaptureHost::new();
    vm.init(&mut host).unwrap();

    for id in ["1", "2", "3"] {
        let response = vm
            .invoke_path(HttpMethod::Get, &format!("/users/{}", id), "", &mut host)
            .unwrap();
        assert_eq!(
            response,
            HandlerResponse::Response {
                status: 200,
                body: format!("user-{}", id)
            }
        );
    }
}

#[test]
fn test_unmatched_path_is_unknown_endpoint() {
    let mut vm = Vm::new(users_artifact());
    let mut host = CaptureHost::new();
    vm.init(&mut host).unwrap();

    let err = vm
        .invoke_path(HttpMethod::Post, "/users/42", "", &mut host)
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::UnknownEndpoint);
}

#[test]
fn test_handler_without_respond_falls_through() {
    let mut artifact = users_artifact();
    // Replace the handler body with an immediate EndHandler
    artifact.instructions[3] = Instruction::EnterFrame(1);
    artifact.instructions[4] = Instruction::EndHandler;
    artifact.endpoints[0].handler_entry = 3;

    let mut vm = Vm::new(artifact);
    let mut host = CaptureHost::new();
    vm.init(&mut host).unwrap();
    let response = vm
        .invoke_path(HttpMethod::Get, "/users/9", "", &mut host)
        .unwrap();
    assert_eq!(
        response,
        HandlerResponse::Response {
            status: 204,
            body: String::new()
        }
    );
}

#[test]
fn test_cancellation_during_handler() {
    let mut vm = Vm::new(users_artifact());
    let mut host = CaptureHost::new();
    vm.init(&mut host).unwrap();

    vm.cancel_token().store(true, std::sync::atomic::Ordering::Relaxed);
    let response = vm
        .invoke_path(HttpMethod::Get, "/users/1", "", &mut host)
        .unwrap();
    assert_eq!(response, HandlerResponse::Cancelled);
}
