//! End-to-end tests over an in-memory cluster with fault injection.

use std::sync::Arc;
use std::time::Duration;
use stripefs_common::{
    xattr_u64, ClusterConfig, Errno, FileId, FileKind, LockCmd, LockRange, OpenFlags,
    XattrOpKind, Xattrs, XATTR_SIZE,
};
use stripefs_erasure::ErasureCoder;
use stripefs_fanout::StripeFs;
use stripefs_transport::mem::{mem_cluster, MemNode};
use stripefs_transport::NodeBackend;

fn cluster(nodes: usize, redundancy: usize) -> (StripeFs, FileId, Vec<Arc<MemNode>>) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
    let config = ClusterConfig::new(nodes, redundancy).unwrap();
    let (mems, root) = mem_cluster(nodes);
    let backends: Vec<Arc<dyn NodeBackend>> = mems
        .iter()
        .map(|n| Arc::clone(n) as Arc<dyn NodeBackend>)
        .collect();
    (StripeFs::new(config, backends).unwrap(), root, mems)
}

fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 7 + i / 255) as u8).collect()
}

async fn wait_heal(fs: &StripeFs, file: FileId) {
    for _ in 0..200 {
        if !fs.inode(file).is_healing() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("heal did not finish");
}

#[tokio::test]
async fn test_create_write_read_roundtrip() {
    let (fs, root, _) = cluster(5, 2);
    let attr = fs
        .create(root, "data.bin", 0o644, OpenFlags::RDWR, 1000, 1000)
        .await
        .unwrap();
    let file = attr.file_id;

    let data = pattern(3000);
    assert_eq!(fs.write(file, 0, &data).await.unwrap(), 3000);
    assert_eq!(&fs.read(file, 0, 3000).await.unwrap()[..], &data[..]);

    // Unaligned interior range crossing stripe boundaries.
    assert_eq!(
        &fs.read(file, 1000, 700).await.unwrap()[..],
        &data[1000..1700]
    );
    // Reads past end of file clamp.
    assert_eq!(&fs.read(file, 2900, 500).await.unwrap()[..], &data[2900..]);
    assert!(fs.read(file, 5000, 10).await.unwrap().is_empty());

    let st = fs.stat(file).await.unwrap();
    assert_eq!(st.size, 3000);
    assert_eq!(st.kind, FileKind::Regular);
}

#[tokio::test]
async fn test_overwrite_mid_file_preserves_rest() {
    let (fs, root, _) = cluster(5, 2);
    let file = fs
        .create(root, "f", 0o644, OpenFlags::RDWR, 0, 0)
        .await
        .unwrap()
        .file_id;

    let mut expect = pattern(4000);
    fs.write(file, 0, &expect).await.unwrap();

    // Unaligned overwrite in the middle forces read-modify-write.
    let patch = vec![0xAB; 900];
    fs.write(file, 1111, &patch).await.unwrap();
    expect[1111..2011].copy_from_slice(&patch);

    assert_eq!(&fs.read(file, 0, 4000).await.unwrap()[..], &expect[..]);
    assert_eq!(fs.stat(file).await.unwrap().size, 4000);
}

#[tokio::test]
async fn test_read_survives_redundancy_node_loss() {
    let (fs, root, _) = cluster(5, 2);
    let file = fs
        .create(root, "f", 0o644, OpenFlags::RDWR, 0, 0)
        .await
        .unwrap()
        .file_id;
    let data = pattern(2000);
    fs.write(file, 0, &data).await.unwrap();

    fs.set_node_up(3, false);
    fs.set_node_up(4, false);
    assert_eq!(&fs.read(file, 0, 2000).await.unwrap()[..], &data[..]);
    assert_eq!(fs.stat(file).await.unwrap().size, 2000);
}

#[tokio::test]
async fn test_write_below_fragment_quorum_fails() {
    let (fs, root, _) = cluster(5, 2);
    let file = fs
        .create(root, "f", 0o644, OpenFlags::RDWR, 0, 0)
        .await
        .unwrap()
        .file_id;

    fs.set_node_up(2, false);
    fs.set_node_up(3, false);
    fs.set_node_up(4, false);
    // Two reachable nodes cannot even store a decodable stripe.
    assert_eq!(fs.write(file, 0, b"x").await, Err(Errno::EIO));
}

#[tokio::test]
async fn test_write_errno_propagates_from_failing_node() {
    let (fs, root, mems) = cluster(5, 2);
    let file = fs
        .create(root, "f", 0o644, OpenFlags::RDWR, 0, 0)
        .await
        .unwrap()
        .file_id;

    mems[2].fail_next(Errno::ENOSPC);
    assert_eq!(fs.write(file, 0, &pattern(100)).await, Err(Errno::ENOSPC));
}

#[tokio::test]
async fn test_stat_split_replies_reach_no_quorum() {
    let (fs, root, mems) = cluster(5, 2);
    let file = fs
        .create(root, "f", 0o644, OpenFlags::RDWR, 0, 0)
        .await
        .unwrap()
        .file_id;

    // Replies split 2+2+1: no faction reaches the fragment quorum of
    // three, and no union of disagreeing factions may pass for one.
    mems[2].tamper_attr(file, |a| a.mode = 0o600);
    mems[3].tamper_attr(file, |a| a.mode = 0o600);
    mems[4].tamper_attr(file, |a| a.mode = 0o640);
    assert_eq!(fs.stat(file).await, Err(Errno::EIO));
}

#[tokio::test]
async fn test_write_through_fresh_client_keeps_size() {
    let (fs, root, mems) = cluster(5, 2);
    let file = fs
        .create(root, "f", 0o644, OpenFlags::RDWR, 0, 0)
        .await
        .unwrap()
        .file_id;
    let data = pattern(3000);
    fs.write(file, 0, &data).await.unwrap();

    // A second client over the same nodes starts with a cold inode
    // table; its small write must not shrink the recorded size.
    let backends: Vec<Arc<dyn NodeBackend>> = mems
        .iter()
        .map(|n| Arc::clone(n) as Arc<dyn NodeBackend>)
        .collect();
    let other = StripeFs::new(*fs.config(), backends).unwrap();
    let patch = vec![0x5A; 100];
    other.write(file, 200, &patch).await.unwrap();

    assert_eq!(mems[0].xattr(file, XATTR_SIZE).unwrap(), xattr_u64(3000));
    assert_eq!(other.inode(file).cached_size(), Some(3000));

    let mut expect = data.clone();
    expect[200..300].copy_from_slice(&patch);
    assert_eq!(&other.read(file, 0, 3000).await.unwrap()[..], &expect[..]);
}

#[tokio::test]
async fn test_offset_overflow_is_rejected() {
    let (fs, root, _) = cluster(5, 2);
    let file = fs
        .create(root, "f", 0o644, OpenFlags::RDWR, 0, 0)
        .await
        .unwrap()
        .file_id;

    assert_eq!(fs.read(file, u64::MAX - 4, 100).await, Err(Errno::EINVAL));
    assert_eq!(fs.write(file, u64::MAX - 4, b"xyz").await, Err(Errno::EINVAL));
    assert_eq!(fs.truncate(file, u64::MAX).await.unwrap_err(), Errno::EINVAL);
}

#[tokio::test]
async fn test_lookup_heals_lost_fragment() {
    let (fs, root, mems) = cluster(5, 2);
    let config = *fs.config();
    let file = fs
        .create(root, "victim", 0o644, OpenFlags::RDWR, 0, 0)
        .await
        .unwrap()
        .file_id;
    let data = pattern(2000);
    fs.write(file, 0, &data).await.unwrap();

    // Node 4 loses its copy entirely.
    mems[4].drop_file(root, "victim", file);
    assert!(!mems[4].has_file(file));

    let (attr, _) = fs.lookup(root, "victim").await.unwrap();
    assert_eq!(attr.size, 2000);
    // A second lookup while the pass may still be in flight must not
    // start another one; the per-inode claim absorbs it.
    fs.lookup(root, "victim").await.unwrap();
    wait_heal(&fs, file).await;

    // The healed fragment is byte-identical to a fresh encoding.
    let mut padded = data.clone();
    padded.resize(config.align_up(2000) as usize, 0);
    let coder = ErasureCoder::new(&config).unwrap();
    let expect = coder.split(4, &padded).unwrap();
    assert_eq!(mems[4].fragment(file).unwrap(), expect.to_vec());
    assert_eq!(mems[4].xattr(file, XATTR_SIZE).unwrap(), xattr_u64(2000));

    // And the file reads cleanly from the healed node's quorum.
    fs.set_node_up(0, false);
    fs.set_node_up(1, false);
    assert_eq!(&fs.read(file, 0, 2000).await.unwrap()[..], &data[..]);
}

#[tokio::test]
async fn test_lookup_heals_divergent_xattrs() {
    let (fs, root, mems) = cluster(5, 2);
    let file = fs
        .create(root, "f", 0o644, OpenFlags::RDWR, 0, 0)
        .await
        .unwrap()
        .file_id;
    fs.write(file, 0, &pattern(600)).await.unwrap();
    let mut user = Xattrs::new();
    user.insert("user.tag".into(), b"blue".to_vec());
    fs.setxattr(file, &user).await.unwrap();

    mems[1].tamper_xattrs(file, |x| {
        x.insert("user.tag".into(), b"red!".to_vec());
    });

    let (_, xattrs) = fs.lookup(root, "f").await.unwrap();
    assert_eq!(xattrs.get("user.tag").unwrap(), b"blue");
    wait_heal(&fs, file).await;
    assert_eq!(mems[1].xattr(file, "user.tag").unwrap(), b"blue".to_vec());
}

#[tokio::test]
async fn test_size_reconciliation_takes_minimum() {
    let (fs, root, mems) = cluster(5, 2);
    let file = fs
        .create(root, "f", 0o644, OpenFlags::RDWR, 0, 0)
        .await
        .unwrap()
        .file_id;
    fs.write(file, 0, &pattern(100)).await.unwrap();

    let (attr, _) = fs.lookup(root, "f").await.unwrap();
    assert_eq!(attr.size, 100);

    // Every node now claims a smaller logical size; the smaller value
    // wins over the cache.
    for mem in &mems {
        mem.tamper_xattrs(file, |x| {
            x.insert(XATTR_SIZE.into(), xattr_u64(60));
        });
    }
    let (attr, _) = fs.lookup(root, "f").await.unwrap();
    assert_eq!(attr.size, 60);
    assert_eq!(fs.inode(file).cached_size(), Some(60));
}

#[tokio::test]
async fn test_truncate_shrinks_and_grows() {
    let (fs, root, _) = cluster(5, 2);
    let file = fs
        .create(root, "f", 0o644, OpenFlags::RDWR, 0, 0)
        .await
        .unwrap()
        .file_id;
    let data = pattern(2000);
    fs.write(file, 0, &data).await.unwrap();

    let attr = fs.truncate(file, 1000).await.unwrap();
    assert_eq!(attr.size, 1000);
    let got = fs.read(file, 0, 2000).await.unwrap();
    assert_eq!(&got[..], &data[..1000]);

    // Growing exposes zero fill.
    fs.truncate(file, 1200).await.unwrap();
    let got = fs.read(file, 0, 2000).await.unwrap();
    assert_eq!(got.len(), 1200);
    assert!(got[1000..].iter().all(|&b| b == 0));
}

#[tokio::test]
async fn test_namespace_operations() {
    let (fs, root, _) = cluster(5, 2);
    let dir = fs.mkdir(root, "docs", 0o755, 0, 0).await.unwrap();
    fs.create(dir.file_id, "a.txt", 0o644, OpenFlags::RDWR, 0, 0)
        .await
        .unwrap();
    fs.symlink(dir.file_id, "ln", "a.txt", 0, 0).await.unwrap();

    let names: Vec<String> = fs
        .readdir(dir.file_id, 0, 100)
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.name)
        .collect();
    assert_eq!(names, vec!["a.txt".to_string(), "ln".to_string()]);

    let (link, _) = fs.lookup(dir.file_id, "ln").await.unwrap();
    assert_eq!(link.kind, FileKind::Symlink);
    assert_eq!(fs.readlink(link.file_id).await.unwrap(), "a.txt");

    fs.rename(dir.file_id, "a.txt", root, "b.txt").await.unwrap();
    assert_eq!(
        fs.lookup(dir.file_id, "a.txt").await.unwrap_err(),
        Errno::ENOENT
    );
    let (moved, _) = fs.lookup(root, "b.txt").await.unwrap();
    assert_eq!(moved.kind, FileKind::Regular);

    fs.unlink(dir.file_id, "ln").await.unwrap();
    fs.rmdir(root, "docs").await.unwrap();
    assert_eq!(fs.lookup(root, "docs").await.unwrap_err(), Errno::ENOENT);
}

#[tokio::test]
async fn test_readdirp_reports_logical_sizes() {
    let (fs, root, _) = cluster(5, 2);
    let file = fs
        .create(root, "big", 0o644, OpenFlags::RDWR, 0, 0)
        .await
        .unwrap()
        .file_id;
    fs.write(file, 0, &pattern(2500)).await.unwrap();

    let entries = fs.readdirp(root, 0, 100).await.unwrap();
    let entry = entries.iter().find(|e| e.name == "big").unwrap();
    assert_eq!(entry.attr.unwrap().size, 2500);
}

#[tokio::test]
async fn test_xattr_surface_hides_internal_keys() {
    let (fs, root, _) = cluster(5, 2);
    let file = fs
        .create(root, "f", 0o644, OpenFlags::RDWR, 0, 0)
        .await
        .unwrap()
        .file_id;

    // Internal bookkeeping keys exist on the nodes but never surface.
    assert!(fs.getxattr(file, None).await.unwrap().is_empty());
    assert_eq!(
        fs.getxattr(file, Some(XATTR_SIZE)).await.unwrap_err(),
        Errno::ENODATA
    );

    let mut user = Xattrs::new();
    user.insert("user.color".into(), b"teal".to_vec());
    fs.setxattr(file, &user).await.unwrap();
    let got = fs.getxattr(file, None).await.unwrap();
    assert_eq!(got.len(), 1);
    assert_eq!(got.get("user.color").unwrap(), b"teal");

    // Mutating the internal namespace is refused outright.
    let mut bad = Xattrs::new();
    bad.insert(XATTR_SIZE.into(), xattr_u64(0));
    assert_eq!(fs.setxattr(file, &bad).await.unwrap_err(), Errno::EPERM);
    assert_eq!(
        fs.removexattr(file, XATTR_SIZE).await.unwrap_err(),
        Errno::EPERM
    );

    fs.removexattr(file, "user.color").await.unwrap();
    assert!(fs.getxattr(file, None).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_xattrop_counts_cluster_wide() {
    let (fs, root, _) = cluster(5, 2);
    let file = fs
        .create(root, "f", 0o644, OpenFlags::RDWR, 0, 0)
        .await
        .unwrap()
        .file_id;

    let mut delta = Xattrs::new();
    delta.insert("user.count".into(), xattr_u64(3));
    fs.xattrop(file, XattrOpKind::Add, &delta).await.unwrap();
    let out = fs.xattrop(file, XattrOpKind::Add, &delta).await.unwrap();
    assert_eq!(out.get("user.count").unwrap(), &xattr_u64(6));
}

#[tokio::test]
async fn test_lock_conflicts_and_rollback() {
    let (fs, root, _) = cluster(5, 2);
    let file = fs
        .create(root, "f", 0o644, OpenFlags::RDWR, 0, 0)
        .await
        .unwrap()
        .file_id;
    let whole = LockRange::whole_file();

    fs.inodelk(file, 1, LockCmd::Lock, whole).await.unwrap();
    assert_eq!(
        fs.inodelk(file, 2, LockCmd::TryLock, whole).await.unwrap_err(),
        Errno::EBUSY
    );

    // After the holder releases, the failed acquisition's rollback must
    // have left no residue blocking a retry.
    fs.inodelk(file, 1, LockCmd::Unlock, whole).await.unwrap();
    fs.inodelk(file, 2, LockCmd::Lock, whole).await.unwrap();
    fs.inodelk(file, 2, LockCmd::Unlock, whole).await.unwrap();

    // Entry locks guard (parent, name) pairs.
    fs.entrylk(root, Some("f"), 7, LockCmd::Lock).await.unwrap();
    assert_eq!(
        fs.entrylk(root, Some("f"), 8, LockCmd::TryLock)
            .await
            .unwrap_err(),
        Errno::EBUSY
    );
    fs.entrylk(root, Some("f"), 7, LockCmd::Unlock).await.unwrap();
}

#[tokio::test]
async fn test_rchecksum_matches_reconstructed_bytes() {
    use sha2::{Digest, Sha256};

    let (fs, root, _) = cluster(5, 2);
    let file = fs
        .create(root, "f", 0o644, OpenFlags::RDWR, 0, 0)
        .await
        .unwrap()
        .file_id;
    let data = pattern(1800);
    fs.write(file, 0, &data).await.unwrap();

    let (weak, strong) = fs.rchecksum(file, 256, 1024).await.unwrap();
    assert_eq!(weak, crc32c::crc32c(&data[256..1280]));
    assert_eq!(strong, Sha256::digest(&data[256..1280]).to_vec());
}

#[tokio::test]
async fn test_statfs_scales_to_logical_capacity() {
    let (fs, root, _) = cluster(5, 2);
    let info = fs.statfs(root).await.unwrap();
    assert_eq!(info.block_size, 512);
    // Each node's raw capacity carries K logical bytes per stored byte.
    assert_eq!(info.blocks, (1u64 << 20) * 3);
    assert!(info.blocks_free <= info.blocks);
}

#[tokio::test]
async fn test_open_truncate_flag() {
    let (fs, root, _) = cluster(5, 2);
    let file = fs
        .create(root, "f", 0o644, OpenFlags::RDWR, 0, 0)
        .await
        .unwrap()
        .file_id;
    fs.write(file, 0, &pattern(1000)).await.unwrap();

    let trunc = OpenFlags {
        read: true,
        write: true,
        truncate: true,
    };
    fs.open(file, trunc).await.unwrap();
    assert_eq!(fs.stat(file).await.unwrap().size, 0);
    assert!(fs.read(file, 0, 100).await.unwrap().is_empty());
}
