//! File-based compilation: includes, DROE_HOME, artifact files, and the
//! standalone executable framing.

use droe_core::{embedded, Artifact};
use droe_runtime::{CaptureHost, Vm};
use droec::{compile_file, CompilerConfig, GeneratedOutput};
use std::fs;
use tempfile::tempdir;

fn artifact_of(output: droec::CompileOutput) -> Artifact {
    match output.output {
        GeneratedOutput::Artifact(a) => a,
        GeneratedOutput::Text(_) => panic!("expected an artifact"),
    }
}

#[test]
fn compile_file_with_include() {
    let dir = tempdir().unwrap();
    fs::write(
        dir.path().join("mathlib.droe"),
        "module mathlib\n  action square with n which is int gives int\n    give n times n\n  end action\nend module\n",
    )
    .unwrap();
    let main = dir.path().join("main.droe");
    fs::write(
        &main,
        "@include mathlib from \"mathlib\"\nset x which is int from mathlib.square with 6\ndisplay x\n",
    )
    .unwrap();

    let output = compile_file(&main, &CompilerConfig::new())
        .unwrap_or_else(|e| panic!("compile failed:\n{}", e.render()));
    let mut vm = Vm::new(artifact_of(output));
    let mut host = CaptureHost::new();
    vm.init(&mut host).unwrap();
    assert_eq!(host.output, "36\n");
}

#[test]
fn include_root_config_overrides_relative_lookup() {
    let home = tempdir().unwrap();
    fs::write(
        home.path().join("shared.droe"),
        "module shared\n  action one gives int\n    give 1\n  end action\nend module\n",
    )
    .unwrap();
    let dir = tempdir().unwrap();
    let main = dir.path().join("main.droe");
    fs::write(
        &main,
        "@include shared from \"shared\"\nset x which is int from shared.one\ndisplay x\n",
    )
    .unwrap();

    let config = CompilerConfig::new().with_include_root(home.path());
    let output = compile_file(&main, &config)
        .unwrap_or_else(|e| panic!("compile failed:\n{}", e.render()));
    let mut vm = Vm::new(artifact_of(output));
    let mut host = CaptureHost::new();
    vm.init(&mut host).unwrap();
    assert_eq!(host.output, "1\n");
}

#[test]
#[serial_test::serial]
fn droe_home_env_is_search_root() {
    let home = tempdir().unwrap();
    fs::write(home.path().join("env_lib.droe"), "set marker to 7\n").unwrap();
    let dir = tempdir().unwrap();
    let main = dir.path().join("main.droe");
    fs::write(&main, "@include env_lib from \"env_lib\"\ndisplay \"ok\"\n").unwrap();

    std::env::set_var("DROE_HOME", home.path());
    let result = compile_file(&main, &CompilerConfig::new());
    std::env::remove_var("DROE_HOME");
    result.unwrap_or_else(|e| panic!("compile failed:\n{}", e.render()));
}

#[test]
fn missing_file_is_io_style_error() {
    let dir = tempdir().unwrap();
    let err = compile_file(&dir.path().join("nope.droe"), &CompilerConfig::new()).unwrap_err();
    assert!(err.diagnostics[0].kind.starts_with("resolve."));
}

#[test]
fn diagnostics_carry_file_positions() {
    let dir = tempdir().unwrap();
    let main = dir.path().join("broken.droe");
    fs::write(&main, "set x to 1\ndisplay missing_name\n").unwrap();
    let err = compile_file(&main, &CompilerConfig::new()).unwrap_err();
    let rendered = err.render();
    assert!(rendered.contains("broken.droe:2:9:"), "got: {}", rendered);
    assert!(rendered.contains("type.unknown_identifier"));
}

#[test]
fn artifact_file_roundtrip_and_execution() {
    let dir = tempdir().unwrap();
    let main = dir.path().join("main.droe");
    fs::write(&main, "display \"from disk\"\n").unwrap();

    let artifact = artifact_of(
        compile_file(&main, &CompilerConfig::new())
            .unwrap_or_else(|e| panic!("compile failed:\n{}", e.render())),
    );
    let artifact_path = dir.path().join("main.drbc");
    artifact.write_file(&artifact_path).unwrap();

    let reloaded = Artifact::read_file(&artifact_path).unwrap();
    let mut vm = Vm::new(reloaded);
    let mut host = CaptureHost::new();
    vm.init(&mut host).unwrap();
    assert_eq!(host.output, "from disk\n");
}

#[test]
fn embedded_framing_survives_a_fake_binary() {
    let dir = tempdir().unwrap();
    let main = dir.path().join("main.droe");
    fs::write(&main, "display \"embedded\"\n").unwrap();
    let artifact = artifact_of(
        compile_file(&main, &CompilerConfig::new())
            .unwrap_or_else(|e| panic!("compile failed:\n{}", e.render())),
    );

    let host_binary = b"\x7fELFfakehostbinarybytes".to_vec();
    let combined = embedded::embed_artifact(&host_binary, &artifact.to_bytes().unwrap());
    let exe_path = dir.path().join("standalone");
    fs::write(&exe_path, &combined).unwrap();

    let loaded = fs::read(&exe_path).unwrap();
    let payload = embedded::extract_artifact(&loaded).expect("payload found");
    let reloaded = Artifact::from_bytes(payload).unwrap();
    let mut vm = Vm::new(reloaded);
    let mut host = CaptureHost::new();
    vm.init(&mut host).unwrap();
    assert_eq!(host.output, "embedded\n");
}
