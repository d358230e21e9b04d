//! Engine CLI invocation
//!
//! Both the orchestrator (module introspection, manifest rendering) and the
//! runner (pipeline execution) talk to the build engine through its CLI.
//! Engine invocations require nested-privileged execution, so the processes
//! hosting this code must be deployed where that is available.
//!
//! The engine embeds an OpenTelemetry collector on a loopback port and
//! exports its endpoint configuration into the environment. Child engine
//! invocations must not inherit those variables or traces fan back into the
//! parent collector in a loop, so every command built here starts from a
//! scrubbed environment.

use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use heck::ToKebabCase;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info};

use pocketci_core::domain::spec::Secret;

use crate::error::EngineError;
use crate::module::{ArgMeta, FunctionMeta, ModuleIntrospector, ModuleMeta, ObjectMeta};

const DEFAULT_BINARY: &str = "dagger";

/// Environment override for the engine binary.
pub const ENGINE_BIN_ENV: &str = "POCKETCI_ENGINE_BIN";

/// Forces provisioning of the base image so the first webhook does not pay
/// the cold-start cost.
const WARMUP_QUERY: &str = r#"{
  container {
    from(address: "ubuntu:lunar") {
      sync
    }
  }
}"#;

/// Lists the module's objects, functions, and argument metadata.
const INTROSPECT_QUERY: &str = r#"{
  currentModule: module {
    name
    objects: objectDefs {
      asObject {
        name
        functions {
          name
          returnType {
            asObject {
              name
            }
          }
          args {
            name
            defaultValue
          }
        }
      }
    }
  }
}"#;

/// Handle to the engine CLI binary.
#[derive(Debug, Clone)]
pub struct EngineCli {
    binary: String,
}

impl EngineCli {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Resolves the binary from `POCKETCI_ENGINE_BIN`, defaulting to
    /// `dagger`.
    pub fn from_env() -> Self {
        let binary = std::env::var(ENGINE_BIN_ENV).unwrap_or_else(|_| DEFAULT_BINARY.to_string());
        Self::new(binary)
    }

    pub fn binary(&self) -> &str {
        &self.binary
    }

    /// Checks that the engine binary exists and answers. Used at startup so
    /// a misconfigured host fails fast instead of on the first pipeline.
    pub async fn available(&self) -> Result<(), EngineError> {
        let output = self
            .command(&["version"])
            .output()
            .await
            .map_err(|source| EngineError::Spawn {
                binary: self.binary.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(failed(&output));
        }

        let version = String::from_utf8_lossy(&output.stdout);
        info!("engine is available: {}", version.trim());
        Ok(())
    }

    /// Builds the engine's base container once so the first webhook does not
    /// block on image pulls.
    pub async fn warmup(&self) -> Result<(), EngineError> {
        info!("warming up engine base container");
        self.run_query(None, None, WARMUP_QUERY).await?;
        Ok(())
    }

    /// Invokes `call` on `module` inside `workdir`, returning the engine's
    /// stdout. `env` is applied on top of the scrubbed environment; each
    /// secret adds a `--<name> env:<FROM_ENV>` flag pair.
    pub async fn call(
        &self,
        workdir: &Path,
        module: &str,
        call: &str,
        env: &HashMap<String, String>,
        secrets: &[Secret],
    ) -> Result<String, EngineError> {
        let script = call_script(&self.binary, module, call, secrets);
        debug!("running engine call: {script}");

        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(&script).current_dir(workdir);
        scrub_otel(&mut cmd);
        cmd.env("CI", "pocketci");
        cmd.envs(env);

        let output = cmd.output().await.map_err(|source| EngineError::Spawn {
            binary: self.binary.clone(),
            source,
        })?;

        if !output.status.success() {
            return Err(failed(&output));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn run_query(
        &self,
        workdir: Option<&Path>,
        module: Option<&str>,
        query: &str,
    ) -> Result<String, EngineError> {
        let mut args = vec!["query"];
        if let Some(module) = module {
            args.push("-m");
            args.push(module);
        }

        let mut cmd = self.command(&args);
        if let Some(dir) = workdir {
            cmd.current_dir(dir);
        }
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = cmd.spawn().map_err(|source| EngineError::Spawn {
            binary: self.binary.clone(),
            source,
        })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(query.as_bytes())
                .await
                .map_err(|source| EngineError::Spawn {
                    binary: self.binary.clone(),
                    source,
                })?;
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|source| EngineError::Spawn {
                binary: self.binary.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(failed(&output));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn command(&self, args: &[&str]) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.args(args);
        scrub_otel(&mut cmd);
        cmd
    }
}

#[async_trait]
impl ModuleIntrospector for EngineCli {
    async fn introspect(
        &self,
        repo_root: &Path,
        module_path: &str,
    ) -> Result<ModuleMeta, EngineError> {
        debug!("introspecting module {module_path}");
        let reply = self
            .run_query(Some(repo_root), Some(module_path), INTROSPECT_QUERY)
            .await?;
        parse_introspection(&reply)
    }
}

/// Assembles the shell line for one engine call.
fn call_script(binary: &str, module: &str, call: &str, secrets: &[Secret]) -> String {
    let module = if module.is_empty() { "ci" } else { module };
    let mut script = format!("{binary} call -m {module} --progress plain {call}");
    for secret in secrets {
        script.push_str(&format!(
            " --{} env:{}",
            secret.name.to_kebab_case(),
            secret.from_env
        ));
    }
    script
}

/// Removes the tracing context the engine would otherwise inherit.
fn scrub_otel(cmd: &mut Command) {
    cmd.env_remove("TRACEPARENT");
    for (key, _) in std::env::vars() {
        if is_otel_var(&key) {
            cmd.env_remove(&key);
        }
    }
}

fn is_otel_var(key: &str) -> bool {
    key == "TRACEPARENT" || key.starts_with("OTEL_EXPORTER_OTLP_")
}

fn failed(output: &std::process::Output) -> EngineError {
    EngineError::Failed {
        status: output.status.code().unwrap_or(-1),
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
    }
}

/// Decodes the introspection query reply into [`ModuleMeta`].
fn parse_introspection(reply: &str) -> Result<ModuleMeta, EngineError> {
    use serde::Deserialize;

    #[derive(Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct Reply {
        current_module: RawModule,
    }

    #[derive(Deserialize)]
    struct RawModule {
        name: String,
        #[serde(default)]
        objects: Vec<RawTypeDef>,
    }

    #[derive(Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct RawTypeDef {
        as_object: Option<RawObject>,
    }

    #[derive(Deserialize)]
    struct RawObject {
        name: String,
        #[serde(default)]
        functions: Vec<RawFunction>,
    }

    #[derive(Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct RawFunction {
        name: String,
        return_type: Option<RawTypeDef>,
        #[serde(default)]
        args: Vec<RawArg>,
    }

    #[derive(Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct RawArg {
        name: String,
        default_value: Option<String>,
    }

    let reply: Reply = serde_json::from_str(reply)?;

    let objects = reply
        .current_module
        .objects
        .into_iter()
        .filter_map(|def| def.as_object)
        .map(|obj| ObjectMeta {
            name: obj.name,
            functions: obj
                .functions
                .into_iter()
                .map(|f| FunctionMeta {
                    name: f.name,
                    returns: f
                        .return_type
                        .and_then(|t| t.as_object)
                        .map(|o| o.name),
                    args: f
                        .args
                        .into_iter()
                        .map(|a| ArgMeta {
                            name: a.name,
                            default_value: a.default_value,
                        })
                        .collect(),
                })
                .collect(),
        })
        .collect();

    Ok(ModuleMeta {
        name: reply.current_module.name,
        objects,
    })
}
