use capscope::capture::{ByteOrder, CaptureWriter};
use capscope::domain::Pid;
use capscope::process::MountNamespace;
use capscope::symbols::SymbolKind;
use capscope::Document;

const HOST_MOUNTS: &str = "\
/dev/nvme0n1p3 / btrfs rw,relatime,subvol=/root 0 0
/dev/nvme0n1p3 /home btrfs rw,relatime,subvol=/home 0 0
/dev/sda1 /mnt/My\\040Data ext4 rw 0 0
proc /proc proc rw 0 0
this line is malformed
";

/// A flatpak-style sandbox: `/usr` comes from a runtime, `/home` is bind mounted
const SANDBOX_MOUNTINFO: &str = "\
100 90 0:33 /home/alice /home/alice rw,relatime shared:2 - btrfs /dev/nvme0n1p3 rw,subvol=/home\r
101 90 8:1 /shared /data rw - ext4 /dev/sda1 rw
102 90 0:50 / /opt rw - overlay overlay rw,lowerdir=/ol/low1:/ol/low2,upperdir=/ol/up,workdir=/ol/w
short line
";

fn document() -> Document {
    let mut w = CaptureWriter::new(ByteOrder::native(), 0);
    w.add_process(10, 0, 300, "/app/bin/editor --new-window file.txt");
    w.add_file(1, 0, -1, "/proc/mounts", HOST_MOUNTS.as_bytes());
    w.add_file(2, 0, -1, "/proc/300/mountinfo", SANDBOX_MOUNTINFO.as_bytes());
    w.add_overlay(3, 0, 300, 0, "/var/lib/flatpak/runtime/platform/files", "/usr");
    w.add_overlay(4, 0, 300, 0, "/var/lib/flatpak/app/editor/files", "/app");
    Document::from_bytes(w.finish()).unwrap()
}

#[test]
fn test_overlays_translate_before_anything_else() {
    let doc = document();
    let namespace = &doc.process_info(Pid(300)).unwrap().mount_namespace;

    assert_eq!(
        namespace.translate("/usr/lib/libgtk-4.so.1"),
        vec!["/var/lib/flatpak/runtime/platform/files/lib/libgtk-4.so.1"]
    );
    assert_eq!(
        namespace.translate("/app/bin/editor"),
        vec!["/var/lib/flatpak/app/editor/files/bin/editor"]
    );
}

#[test]
fn test_bind_mounts_resolve_through_host_devices() {
    let doc = document();
    let namespace = &doc.process_info(Pid(300)).unwrap().mount_namespace;

    // btrfs subvolume root stripped, trailing \r ignored
    assert_eq!(namespace.translate("/home/alice/bin/tool"), vec!["/home/alice/bin/tool"]);
    // escaped space in the host mount point
    assert_eq!(namespace.translate("/data/report.pdf"), vec!["/mnt/My Data/shared/report.pdf"]);
}

#[test]
fn test_overlayfs_candidates_upper_first() {
    let doc = document();
    let namespace = &doc.process_info(Pid(300)).unwrap().mount_namespace;
    assert_eq!(
        namespace.translate("/opt/tool/lib.so"),
        vec!["/ol/up/tool/lib.so", "/ol/low1/tool/lib.so", "/ol/low2/tool/lib.so"]
    );
}

#[test]
fn test_unmatched_paths_pass_through() {
    let doc = document();
    let namespace = &doc.process_info(Pid(300)).unwrap().mount_namespace;
    assert_eq!(namespace.translate("/etc/os-release"), vec!["/etc/os-release"]);
    assert_eq!(MountNamespace::new().translate("/x/y"), vec!["/x/y"]);
}

#[test]
fn test_host_devices_reach_every_process() {
    let doc = document();
    for process in doc.list_processes() {
        assert_eq!(process.mount_namespace.devices().len(), 4, "pid {}", process.pid);
    }
    // short mountinfo lines are skipped
    let sandbox = doc.process_info(Pid(300)).unwrap();
    assert_eq!(sandbox.mount_namespace.mounts().len(), 3 + 2);
}

#[test]
fn test_command_line_names_the_process() {
    let mut w = CaptureWriter::new(ByteOrder::native(), 0);
    w.add_process(1, 0, 77, "/usr/bin/foo bar baz");
    let doc = Document::from_bytes(w.finish()).unwrap();

    let symbol = doc.process_symbol(Pid(77)).unwrap();
    assert_eq!(symbol.name(), "/usr/bin/foo");
    assert_eq!(symbol.kind(), SymbolKind::Process);
    assert!(!symbol.is_fallback());
    assert_eq!(
        doc.process_info(Pid(77)).unwrap().command_line(),
        Some("/usr/bin/foo bar baz")
    );
}

#[test]
fn test_unnamed_process_gets_fallback_symbol() {
    let mut w = CaptureWriter::new(ByteOrder::native(), 0);
    w.add_sample(1, 0, 88, 88, &[0x1000]);
    let doc = Document::from_bytes(w.finish()).unwrap();

    let symbol = doc.process_symbol(Pid(88)).unwrap();
    assert_eq!(symbol.name(), "Process 88");
    assert!(symbol.is_fallback());
    // negative pids name the kernel
    assert_eq!(doc.process_symbol(Pid(-1)).unwrap().name(), "Process 0");
}
