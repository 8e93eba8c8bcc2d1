// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Validate the session filesystem operation handlers.
// Author: Lukas Bower
#![forbid(unsafe_code)]

use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use promptfs::driver::PromptFs;
use promptfs::gateway::{CompletionGateway, GatewayError};
use promptfs::namespace::EntryKind;
use promptfs::FsError;

struct EchoGateway;

impl CompletionGateway for EchoGateway {
    fn complete(&self, prompt: &[u8]) -> Result<Vec<u8>, GatewayError> {
        Ok(prompt.to_vec())
    }
}

struct FailingGateway(&'static str);

impl CompletionGateway for FailingGateway {
    fn complete(&self, _prompt: &[u8]) -> Result<Vec<u8>, GatewayError> {
        Err(GatewayError::Transport(self.0.to_owned()))
    }
}

/// Blocks inside complete() until released, to hold the request guard open.
struct GatedGateway {
    entered: mpsc::Sender<()>,
    release: Mutex<mpsc::Receiver<()>>,
}

impl CompletionGateway for GatedGateway {
    fn complete(&self, prompt: &[u8]) -> Result<Vec<u8>, GatewayError> {
        let _ = self.entered.send(());
        let _ = self.release.lock().expect("release lock").recv();
        Ok(prompt.to_vec())
    }
}

fn echo_fs() -> PromptFs<EchoGateway> {
    let fs = PromptFs::new(EchoGateway);
    fs.mkdir("/s1", 0o755).expect("mkdir /s1");
    fs
}

fn read_all<G: CompletionGateway>(fs: &PromptFs<G>, path: &str) -> Vec<u8> {
    fs.read(path, 0, u32::MAX).expect("read")
}

#[test]
fn new_session_lists_three_empty_members() {
    let fs = echo_fs();
    assert_eq!(fs.readdir("/"), vec!["s1".to_owned()]);
    let mut members = fs.readdir("/s1");
    members.sort();
    assert_eq!(members, vec!["error", "request", "response"]);
    for member in ["request", "response", "error"] {
        let entry = fs.getattr(&format!("/s1/{member}")).expect("member attr");
        assert_eq!(entry.kind, EntryKind::RegularFile);
        assert_eq!(entry.size, 0);
        assert_eq!(entry.perm, 0o666);
    }
    let dir = fs.getattr("/s1").expect("session attr");
    assert_eq!(dir.kind, EntryKind::Directory);
    assert_eq!(dir.nlink, 2);
}

#[test]
fn request_write_populates_response_and_clears_error() {
    let fs = echo_fs();
    let written = fs.write("/s1/request", 0, b"hello").expect("write");
    assert_eq!(written, 5);
    assert_eq!(read_all(&fs, "/s1/response"), b"hello");
    assert_eq!(read_all(&fs, "/s1/error"), b"");
    assert_eq!(fs.getattr("/s1/response").expect("attr").size, 5);
}

#[test]
fn gateway_failure_lands_in_the_error_file() {
    let fs = PromptFs::new(FailingGateway("timeout"));
    fs.mkdir("/s1", 0o755).expect("mkdir");
    let written = fs.write("/s1/request", 0, b"hello").expect("write");
    assert_eq!(written, 5);
    assert_eq!(read_all(&fs, "/s1/response"), b"");
    let diagnostic = String::from_utf8(read_all(&fs, "/s1/error")).expect("utf8");
    assert!(diagnostic.starts_with("Error: "));
    assert!(diagnostic.contains("timeout"));
}

#[test]
fn each_cycle_resets_both_outcome_files() {
    let fs = echo_fs();
    fs.write("/s1/request", 0, b"first").expect("write");
    assert_eq!(read_all(&fs, "/s1/response"), b"first");
    fs.write("/s1/request", 0, b"second").expect("write");
    assert_eq!(read_all(&fs, "/s1/response"), b"second");
    assert_eq!(read_all(&fs, "/s1/error"), b"");
}

#[test]
fn removed_session_resolves_nothing() {
    let fs = echo_fs();
    fs.write("/s1/request", 0, b"hello").expect("write");
    fs.rmdir("/s1").expect("rmdir");
    assert_eq!(fs.getattr("/s1/request"), Err(FsError::NotFound));
    assert_eq!(fs.getattr("/s1"), Err(FsError::NotFound));
    assert!(fs.readdir("/").is_empty());
    assert_eq!(fs.read("/s1/response", 0, 16), Err(FsError::NotFound));
}

#[test]
fn only_the_request_file_accepts_writes() {
    let fs = echo_fs();
    assert_eq!(
        fs.write("/s1/response", 0, b"x"),
        Err(FsError::NotPermitted)
    );
    assert_eq!(fs.write("/s1/error", 0, b"x"), Err(FsError::NotPermitted));
    assert_eq!(fs.write("/s1", 0, b"x"), Err(FsError::NotPermitted));
    assert_eq!(fs.write("/", 0, b"x"), Err(FsError::NotPermitted));
    assert_eq!(
        fs.write("/s1/request/deep", 0, b"x"),
        Err(FsError::NotPermitted)
    );
    assert_eq!(fs.write("/ghost/request", 0, b"x"), Err(FsError::NotFound));
}

#[test]
fn writes_at_offset_zero_overwrite_wholesale() {
    let fs = echo_fs();
    fs.write("/s1/request", 0, b"first payload").expect("write");
    fs.write("/s1/request", 0, b"second").expect("write");
    assert_eq!(read_all(&fs, "/s1/request"), b"second");
    assert_eq!(read_all(&fs, "/s1/response"), b"second");
}

#[test]
fn sparse_writes_gap_fill_with_nulls() {
    let fs = echo_fs();
    fs.write("/s1/request", 4, b"tail").expect("write");
    let buffer = read_all(&fs, "/s1/request");
    assert_eq!(buffer.len(), 8);
    assert_eq!(&buffer[..4], b"\0\0\0\0");
    assert_eq!(&buffer[4..], b"tail");
    assert_eq!(fs.getattr("/s1/request").expect("attr").size, 8);
    // The prompt submitted upstream is the whole gap-filled buffer.
    assert_eq!(read_all(&fs, "/s1/response"), b"\0\0\0\0tail");
}

#[test]
fn reads_are_idempotent_and_clipped() {
    let fs = echo_fs();
    fs.write("/s1/request", 0, b"hello").expect("write");
    let first = fs.read("/s1/response", 0, 64).expect("read");
    let second = fs.read("/s1/response", 0, 64).expect("read");
    assert_eq!(first, second);
    assert_eq!(fs.read("/s1/response", 1, 2).expect("read"), b"el");
    assert_eq!(fs.read("/s1/response", 64, 16).expect("read"), b"");
    assert_eq!(fs.read("/s1/missing", 0, 16), Err(FsError::NotFound));
    assert_eq!(fs.read("/s1", 0, 16), Err(FsError::NotPermitted));
}

#[test]
fn response_reads_before_any_write_are_empty() {
    let fs = echo_fs();
    assert_eq!(read_all(&fs, "/s1/response"), b"");
    assert_eq!(read_all(&fs, "/s1/error"), b"");
}

#[test]
fn sessions_only_exist_directly_under_root() {
    let fs = echo_fs();
    assert_eq!(fs.mkdir("/s1", 0o755), Err(FsError::Exists));
    assert_eq!(fs.mkdir("/s1/nested", 0o755), Err(FsError::NotPermitted));
    assert_eq!(fs.mkdir("/", 0o755), Err(FsError::NotPermitted));
    assert_eq!(fs.rmdir("/s1/request"), Err(FsError::NotPermitted));
    assert_eq!(fs.rmdir("/ghost"), Err(FsError::NotFound));
}

#[test]
fn create_rejects_anything_but_member_files() {
    let fs = echo_fs();
    let fh = fs.create("/s1/request", 0o666).expect("create");
    assert!(fh > 0);
    assert_eq!(fs.create("/s1/notes", 0o666), Err(FsError::NotPermitted));
    assert_eq!(fs.create("/top", 0o666), Err(FsError::NotPermitted));
    assert_eq!(fs.create("/ghost/request", 0o666), Err(FsError::NotFound));
}

#[test]
fn create_reinitializes_an_existing_member() {
    let fs = echo_fs();
    fs.write("/s1/request", 0, b"stale").expect("write");
    fs.create("/s1/request", 0o666).expect("create");
    assert_eq!(fs.getattr("/s1/request").expect("attr").size, 0);
    assert_eq!(read_all(&fs, "/s1/request"), b"");
}

#[test]
fn open_handles_increase_monotonically() {
    let fs = echo_fs();
    let first = fs.open();
    let second = fs.open();
    assert!(second > first);
}

#[test]
fn truncate_shrinks_member_files_only() {
    let fs = echo_fs();
    fs.write("/s1/request", 0, b"hello").expect("write");
    fs.truncate("/s1/request", 2).expect("truncate");
    assert_eq!(read_all(&fs, "/s1/request"), b"he");
    assert_eq!(fs.getattr("/s1/request").expect("attr").size, 2);
    fs.truncate("/s1/request", 64).expect("truncate");
    assert_eq!(fs.getattr("/s1/request").expect("attr").size, 2);
    assert_eq!(fs.truncate("/s1", 0), Err(FsError::NotPermitted));
    assert_eq!(fs.truncate("/ghost/request", 0), Err(FsError::NotFound));
}

#[test]
fn metadata_mutations_follow_the_table() {
    let fs = echo_fs();
    fs.chmod("/s1/request", 0o600).expect("chmod");
    assert_eq!(fs.getattr("/s1/request").expect("attr").perm, 0o600);
    assert_eq!(fs.chmod("/ghost", 0o600), Err(FsError::NotFound));
    fs.chown("/s1/request", Some(1000), None).expect("chown");
    let entry = fs.getattr("/s1/request").expect("attr");
    assert_eq!(entry.uid, 1000);
    assert_eq!(entry.gid, 0);
    // utimens on a missing entry is a silent no-op.
    fs.utimens("/ghost", None, None);
    fs.utimens("/s1/request", Some(std::time::UNIX_EPOCH), None);
    let entry = fs.getattr("/s1/request").expect("attr");
    assert_eq!(entry.accessed, std::time::UNIX_EPOCH);
}

#[test]
fn link_operations_are_rejected_by_design() {
    let fs = echo_fs();
    assert_eq!(fs.unlink("/s1/request"), Err(FsError::NotPermitted));
    assert_eq!(fs.rename("/s1", "/s2"), Err(FsError::NotPermitted));
    assert_eq!(fs.symlink("/s1/request", "/s1/alias"), Err(FsError::NotPermitted));
}

#[test]
fn statfs_reports_fixed_figures() {
    let fs = echo_fs();
    let stats = fs.statfs();
    assert_eq!(stats.block_size, 512);
    assert_eq!(stats.blocks, 4096);
    assert_eq!(stats.blocks_available, 2048);
}

#[test]
fn sessions_are_isolated_from_each_other() {
    let fs = echo_fs();
    fs.mkdir("/s2", 0o755).expect("mkdir /s2");
    fs.write("/s1/request", 0, b"one").expect("write");
    fs.write("/s2/request", 0, b"two").expect("write");
    assert_eq!(read_all(&fs, "/s1/response"), b"one");
    assert_eq!(read_all(&fs, "/s2/response"), b"two");
    fs.rmdir("/s2").expect("rmdir");
    assert_eq!(read_all(&fs, "/s1/response"), b"one");
    let mut names = fs.readdir("/");
    names.sort();
    assert_eq!(names, vec!["s1".to_owned()]);
}

#[test]
fn session_removal_waits_for_an_inflight_cycle() {
    let (entered_tx, entered_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel();
    let fs = Arc::new(PromptFs::new(GatedGateway {
        entered: entered_tx,
        release: Mutex::new(release_rx),
    }));
    fs.mkdir("/s1", 0o755).expect("mkdir");

    let writer = {
        let fs = Arc::clone(&fs);
        thread::spawn(move || fs.write("/s1/request", 0, b"ping"))
    };
    entered_rx.recv().expect("gateway entered");

    let remover = {
        let fs = Arc::clone(&fs);
        thread::spawn(move || fs.rmdir("/s1"))
    };
    thread::sleep(Duration::from_millis(50));
    // The cycle still holds the guard, so the session must still be intact.
    assert!(fs.getattr("/s1/response").is_ok());

    release_tx.send(()).expect("release gateway");
    assert_eq!(writer.join().expect("writer"), Ok(4));
    assert_eq!(remover.join().expect("remover"), Ok(()));
    assert_eq!(fs.getattr("/s1/request"), Err(FsError::NotFound));
}
