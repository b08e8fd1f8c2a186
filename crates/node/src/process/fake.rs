//! In-memory stand-in for the docker, crontab and probing binaries.

use super::{CommandError, CommandOutput, ProcessRunner};
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

#[derive(Debug, Default)]
pub(crate) struct FakeState {
    pub(crate) networks: BTreeSet<String>,
    /// container name -> running
    pub(crate) containers: BTreeMap<String, bool>,
    /// "repo:tag" -> recorded repo digests
    pub(crate) images: BTreeMap<String, Vec<String>>,
    /// "repo:tag" -> registry digest; absent means the registry is unreachable
    pub(crate) registry: BTreeMap<String, String>,
    pub(crate) crontab: Option<String>,
    pub(crate) cpu_count: u32,
    pub(crate) memory_bytes: u64,
    pub(crate) gpu_available: bool,
    /// Subcommands (e.g. "stop", "network rm") that exit non-zero.
    pub(crate) failing: BTreeSet<String>,
    pub(crate) calls: Vec<Vec<String>>,
}

pub(crate) struct FakeRunner {
    pub(crate) state: Mutex<FakeState>,
}

const MUTATING: [&str; 8] = [
    "run",
    "stop",
    "rm",
    "network create",
    "network rm",
    "image pull",
    "image rm",
    "crontab",
];

impl FakeRunner {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(FakeState {
                cpu_count: 8,
                memory_bytes: 16 * 1024 * 1024 * 1024,
                ..Default::default()
            }),
        }
    }

    pub(crate) fn with<F: FnOnce(&mut FakeState)>(self, setup: F) -> Self {
        setup(&mut self.state.lock().unwrap());
        self
    }

    pub(crate) fn state(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    pub(crate) fn calls(&self) -> Vec<Vec<String>> {
        self.state().calls.clone()
    }

    /// Calls that change docker or crontab state.
    pub(crate) fn mutating_calls(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .map(|call| call.join(" "))
            .filter(|call| {
                MUTATING.iter().any(|prefix| {
                    let docker_prefix = format!("docker {prefix} ");
                    call.starts_with(&docker_prefix)
                        || (*prefix == "crontab" && call.starts_with("crontab ") && call != "crontab -l")
                })
            })
            .collect()
    }

    pub(crate) fn called(&self, prefix: &str) -> bool {
        self.calls()
            .iter()
            .any(|call| call.join(" ").starts_with(prefix))
    }
}

fn ok(stdout: impl Into<String>) -> CommandOutput {
    CommandOutput {
        status_code: 0,
        stdout: stdout.into(),
        stderr: String::new(),
    }
}

fn fail(stderr: impl Into<String>) -> CommandOutput {
    CommandOutput {
        status_code: 1,
        stdout: String::new(),
        stderr: stderr.into(),
    }
}

fn flag_value(args: &[String], flag: &str) -> Option<String> {
    args.iter()
        .position(|arg| arg == flag)
        .and_then(|idx| args.get(idx + 1))
        .cloned()
}

fn repository_of(reference: &str) -> &str {
    match reference.rsplit_once(':') {
        Some((repo, tag)) if !tag.contains('/') => repo,
        _ => reference,
    }
}

impl FakeState {
    fn docker(&mut self, args: &[String]) -> CommandOutput {
        let words: Vec<&str> = args.iter().map(String::as_str).collect();
        let subcommand = match words.as_slice() {
            ["network", sub, ..] | ["image", sub, ..] | ["manifest", sub, ..] => {
                format!("{} {sub}", words[0])
            }
            [first, ..] => first.to_string(),
            [] => return fail("no command"),
        };
        if self.failing.contains(&subcommand) {
            return fail(format!("simulated failure of {subcommand}"));
        }

        match words.as_slice() {
            ["network", "ls", ..] => ok(self
                .networks
                .iter()
                .map(|n| format!("{n}\n"))
                .collect::<String>()),
            ["network", "create", .., name] => {
                if !self.networks.insert(name.to_string()) {
                    return fail(format!("network with name {name} already exists"));
                }
                ok("network-id\n")
            }
            ["network", "rm", name] => {
                if self.networks.remove(*name) {
                    ok(format!("{name}\n"))
                } else {
                    fail(format!("network {name} not found"))
                }
            }
            ["ps", "-a", ..] => ok(self
                .containers
                .keys()
                .map(|n| format!("{n}\n"))
                .collect::<String>()),
            ["ps", ..] => ok(self
                .containers
                .iter()
                .filter(|(_, running)| **running)
                .map(|(n, _)| format!("{n}\n"))
                .collect::<String>()),
            ["image", "pull", reference] => match self.registry.get(*reference) {
                Some(digest) => {
                    let repo = repository_of(reference);
                    self.images
                        .insert(reference.to_string(), vec![format!("{repo}@{digest}")]);
                    ok("pulled\n")
                }
                None => fail("registry unreachable"),
            },
            ["image", "inspect", reference] => match self.images.get(*reference) {
                Some(digests) => ok(serde_json::json!([{ "RepoDigests": digests }]).to_string()),
                None => fail(format!("No such image: {reference}")),
            },
            ["manifest", "inspect", "--verbose", reference] => match self.registry.get(*reference)
            {
                Some(digest) => ok(serde_json::json!({
                    "Ref": reference,
                    "Descriptor": { "digest": digest }
                })
                .to_string()),
                None => fail("manifest unknown"),
            },
            ["image", "ls", repo, ..] => {
                let prefix = format!("{repo}:");
                ok(self
                    .images
                    .keys()
                    .filter_map(|key| key.strip_prefix(&prefix))
                    .map(|tag| format!("{tag}\t{tag}-id\n"))
                    .collect::<String>())
            }
            ["image", "rm", reference] => {
                if self.images.remove(*reference).is_some() {
                    ok(format!("Untagged: {reference}\n"))
                } else {
                    fail(format!("No such image: {reference}"))
                }
            }
            ["run", ..] => {
                let Some(name) = flag_value(args, "--name") else {
                    return fail("missing --name");
                };
                if let Some(network) = flag_value(args, "--network") {
                    if !self.networks.contains(&network) {
                        return fail(format!("network {network} not found"));
                    }
                }
                if self.containers.contains_key(&name) {
                    return fail(format!("container name {name} is already in use"));
                }
                self.containers.insert(name, true);
                ok("container-id\n")
            }
            ["stop", name] => match self.containers.get_mut(*name) {
                Some(running) => {
                    *running = false;
                    ok(format!("{name}\n"))
                }
                None => fail(format!("No such container: {name}")),
            },
            ["rm", name] => {
                if self.containers.remove(*name).is_some() {
                    ok(format!("{name}\n"))
                } else {
                    fail(format!("No such container: {name}"))
                }
            }
            ["info", ..] => ok(serde_json::json!({
                "NCPU": self.cpu_count,
                "MemTotal": self.memory_bytes,
            })
            .to_string()),
            _ => fail(format!("unsupported docker command: {}", words.join(" "))),
        }
    }

    fn crontab(&mut self, args: &[String]) -> CommandOutput {
        match args {
            [flag] if flag == "-l" => match &self.crontab {
                Some(table) => ok(table.clone()),
                None => fail("no crontab for user"),
            },
            [path] => match std::fs::read_to_string(path) {
                Ok(contents) => {
                    self.crontab = Some(contents);
                    ok("")
                }
                Err(e) => fail(e.to_string()),
            },
            _ => fail("usage: crontab [file | -l]"),
        }
    }
}

#[async_trait]
impl ProcessRunner for FakeRunner {
    async fn output(&self, program: &str, args: &[String]) -> Result<CommandOutput, CommandError> {
        let mut state = self.state.lock().unwrap();
        let mut call = vec![program.to_string()];
        call.extend(args.iter().cloned());
        state.calls.push(call);

        let output = match program {
            "docker" | "/usr/bin/docker" => state.docker(args),
            "crontab" => state.crontab(args),
            "which" => match args.first().map(String::as_str) {
                Some("docker") => ok("/usr/bin/docker\n"),
                _ => fail(""),
            },
            "nvidia-smi" if state.gpu_available => ok("GPU 0\n"),
            "nvidia-smi" => fail("not found"),
            _ => {
                return Err(CommandError::Spawn {
                    program: program.to_string(),
                    source: std::io::Error::new(std::io::ErrorKind::NotFound, "not found"),
                })
            }
        };
        Ok(output)
    }
}
