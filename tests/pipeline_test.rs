//! End-to-end pipeline tests through the scripted executor
//!
//! These tests drive the orchestrator over several OS families without a
//! container runtime and check what lands in the diff record directory.

use binfinder::exec::MockExecutor;
use binfinder::pipeline::SkipReason;
use binfinder::progress::NoOpHandler;
use binfinder::scripts::ScriptSet;
use binfinder::{
    BinfinderConfig, DiffRecord, DiffStore, ImageOutcome, ImagePipeline, ImageRef, JsonDiffStore,
    Orchestrator,
};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn script_alpine(mock: &MockExecutor, image: &str) {
    mock.respond(image, "cat /etc/os-release", "NAME=\"Alpine Linux\"\nID=alpine\n");
    mock.respond(
        image,
        "cat /lib/apk/db/installed",
        "C:Q1abc=\nP:musl\nV:1.1.22\n\nP:busybox\nV:1.30.1\n",
    );
    mock.respond(image, "apk info -L musl", "musl-1.1.22 contains:\nlib/ld-musl-x86_64.so.1\n");
    mock.respond(image, "apk info -L busybox", "busybox-1.30.1 contains:\nbin/busybox\n");
    mock.respond(
        image,
        "sh /binfinder/alpine-sweep.sh",
        "/bin/busybox: ELF 64-bit LSB executable, x86-64\n\
         /lib/ld-musl-x86_64.so.1: ELF 64-bit LSB shared object, x86-64\n\
         /usr/bin/find: ELF 64-bit LSB executable, x86-64\n\
         /usr/bin/file: ELF 64-bit LSB executable, x86-64\n\
         /usr/libexec/code: ELF 64-bit LSB executable, x86-64\n\
         /etc/motd: ASCII text\n",
    );
}

fn script_ubuntu(mock: &MockExecutor, image: &str) {
    mock.respond(image, "cat /etc/os-release", "NAME=\"Ubuntu\"\nVERSION=\"22.04\"\n");
    mock.respond(image, "ls /var/lib/dpkg/info/", "bash.list\nbash.md5sums\ncoreutils.list\n");
    mock.respond(
        image,
        "cat /var/lib/dpkg/info/bash.list /var/lib/dpkg/info/coreutils.list",
        "/.\n/bin\n/bin/bash\n/bin\n/bin/ls\n",
    );
    mock.respond(
        image,
        "sh /binfinder/debian-sweep.sh",
        "/bin/bash: ELF 64-bit LSB pie executable\n\
         /bin/ls: ELF 64-bit LSB pie executable\n\
         /usr/local/bin/tini: ELF 64-bit LSB executable, statically linked\n",
    );
}

fn script_centos(mock: &MockExecutor, image: &str) {
    mock.respond(image, "cat /etc/os-release", "NAME=\"CentOS Linux\"\nVERSION=\"7\"\n");
    mock.respond(
        image,
        "sh /binfinder/rhel-packages.sh",
        "/usr/bin/bash\n/usr/bin/file\n",
    );
    mock.respond(
        image,
        "sh /binfinder/rhel-sweep.sh",
        "/usr/bin/bash: ELF 64-bit LSB executable\n\
         /usr/bin/hostname: ELF 64-bit LSB executable\n\
         /bin/zz: ELF 64-bit LSB executable\n\
         /usr/bin/hostname: ELF 64-bit LSB executable\n",
    );
}

struct Harness {
    temp: TempDir,
    mock: Arc<MockExecutor>,
    store: Arc<JsonDiffStore>,
}

impl Harness {
    fn new(mock: MockExecutor) -> Self {
        let temp = TempDir::new().unwrap();
        let store = JsonDiffStore::create(temp.path().join("data")).unwrap();
        Self {
            temp,
            mock: Arc::new(mock),
            store: Arc::new(store),
        }
    }

    fn orchestrator(&self, workers: usize) -> Orchestrator {
        let mut config = BinfinderConfig::builtin();
        config.output_dir = self.store.dir().to_path_buf();
        config.pull_images = false;

        let pipeline = ImagePipeline::new(
            self.mock.clone(),
            ScriptSet::new(self.temp.path().join("scripts")),
            self.store.clone(),
            Arc::new(config),
            Arc::new(NoOpHandler),
        );
        Orchestrator::new(pipeline, workers)
    }

    fn record(&self, image: &str) -> DiffRecord {
        let path = self.store.record_path(&ImageRef::new(image));
        serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
    }
}

fn images(names: &[&str]) -> Vec<ImageRef> {
    names.iter().map(|n| ImageRef::new(*n)).collect()
}

#[tokio::test]
async fn test_mixed_families_reconcile() {
    let harness = Harness::new(MockExecutor::new());
    script_alpine(&harness.mock, "alpine:3.10");
    script_ubuntu(&harness.mock, "ubuntu:22.04");
    script_centos(&harness.mock, "centos:7");

    let summary = harness
        .orchestrator(2)
        .run(images(&["alpine:3.10", "ubuntu:22.04", "centos:7"]))
        .await;

    assert_eq!(summary.persisted(), 3);
    assert_eq!(harness.record("alpine:3.10").elf_names, vec!["/usr/libexec/code"]);
    assert_eq!(
        harness.record("ubuntu:22.04").elf_names,
        vec!["/usr/local/bin/tini"]
    );
    assert_eq!(
        harness.record("centos:7").elf_names,
        vec!["/bin/zz", "/usr/bin/hostname"]
    );
}

#[tokio::test]
async fn test_second_run_skips_persisted_images() {
    let harness = Harness::new(MockExecutor::new());
    script_alpine(&harness.mock, "alpine:3.10");

    let first = harness.orchestrator(1).run(images(&["alpine:3.10"])).await;
    assert_eq!(first.persisted(), 1);
    let calls_after_first = harness.mock.calls().len();

    let second = harness.orchestrator(1).run(images(&["alpine:3.10"])).await;
    assert!(matches!(
        second.outcome("alpine:3.10"),
        Some(ImageOutcome::Skipped(SkipReason::AlreadyPersisted))
    ));
    assert_eq!(harness.mock.calls().len(), calls_after_first);
}

#[tokio::test]
async fn test_worker_bound_is_respected() {
    let harness = Harness::new(MockExecutor::new().with_delay(Duration::from_millis(20)));
    let names: Vec<String> = (0..6).map(|i| format!("ubuntu:{}", i)).collect();
    for name in &names {
        script_ubuntu(&harness.mock, name);
    }

    let refs: Vec<&str> = names.iter().map(String::as_str).collect();
    let summary = harness.orchestrator(2).run(images(&refs)).await;

    assert_eq!(summary.persisted(), 6);
    assert!(harness.mock.max_in_flight() <= 2);
}

#[tokio::test]
async fn test_failure_is_isolated_to_its_image() {
    let harness = Harness::new(MockExecutor::new());
    script_alpine(&harness.mock, "alpine:3.10");
    script_centos(&harness.mock, "centos:7");
    harness
        .mock
        .respond("debian:12", "cat /etc/os-release", "PRETTY_NAME=\"Debian GNU/Linux 12\"\n");
    harness.mock.fail(
        "debian:12",
        "ls /var/lib/dpkg/info/",
        "ls: cannot access '/var/lib/dpkg/info/': No such file or directory",
    );

    let summary = harness
        .orchestrator(3)
        .run(images(&["alpine:3.10", "debian:12", "centos:7"]))
        .await;

    assert_eq!(summary.persisted(), 2);
    assert_eq!(summary.failed(), 1);
    match summary.outcome("debian:12") {
        Some(ImageOutcome::Failed(error)) => assert_eq!(error.stage(), "manifest"),
        other => panic!("unexpected outcome: {:?}", other),
    }
    assert!(!harness.store.contains(&ImageRef::new("debian:12")));
}

#[tokio::test]
async fn test_records_feed_back_through_the_store() {
    let harness = Harness::new(MockExecutor::new());
    script_alpine(&harness.mock, "alpine:3.10");
    script_centos(&harness.mock, "centos:7");

    harness
        .orchestrator(2)
        .run(images(&["alpine:3.10", "centos:7", "busybox"]))
        .await;

    let loaded = harness.store.load_all().unwrap();
    let mut names: Vec<&str> = loaded
        .records
        .iter()
        .map(|r| r.image_name.as_str())
        .collect();
    names.sort();
    assert_eq!(names, vec!["alpine:3.10", "centos:7"]);
    assert!(loaded.skipped.is_empty());
}

#[tokio::test]
async fn test_empty_sweep_fails_and_is_retried() {
    let harness = Harness::new(MockExecutor::new());
    script_ubuntu(&harness.mock, "ubuntu:offline");
    harness
        .mock
        .respond("ubuntu:offline", "sh /binfinder/debian-sweep.sh", "");

    let first = harness.orchestrator(1).run(images(&["ubuntu:offline"])).await;
    match first.outcome("ubuntu:offline") {
        Some(ImageOutcome::Failed(error)) => assert_eq!(error.stage(), "scan"),
        other => panic!("unexpected outcome: {:?}", other),
    }
    assert!(!harness.store.contains(&ImageRef::new("ubuntu:offline")));

    let calls_after_first = harness.mock.calls().len();
    let second = harness.orchestrator(1).run(images(&["ubuntu:offline"])).await;
    assert_eq!(second.failed(), 1);
    assert!(harness.mock.calls().len() > calls_after_first);
}
