//! File handle operations against the fake server

use super::fake_server::ServerOptions;
use super::test_context::TestContext;
use crate::client::{FileType, OpenFlags, Whence};
use crate::error::Error;
use crate::protocol::NtStatus;
use nix::errno::Errno;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_then_read_back() {
        let test = TestContext::new();
        let ctx = &test.ctx;

        // 1. Create and write
        let handle = ctx
            .open("notes.txt", OpenFlags::READ | OpenFlags::WRITE | OpenFlags::CREATE)
            .wait()
            .unwrap();
        assert_eq!(handle.path().as_deref(), Some("notes.txt"));
        assert_eq!(handle.write(b"hello ").wait().unwrap(), 6);
        assert_eq!(handle.write(b"world").wait().unwrap(), 5);
        assert_eq!(handle.offset(), Some(11));

        // 2. Read from the start
        assert_eq!(handle.lseek(0, Whence::Set).unwrap(), 0);
        assert_eq!(handle.read(64).wait().unwrap(), b"hello world");
        assert!(handle.read(64).wait().unwrap().is_empty(), "expected EOF");

        // 3. The bytes really landed on the server
        handle.close().wait().unwrap();
        assert_eq!(test.read_file("notes.txt"), b"hello world");
    }

    #[test]
    fn test_positional_io_leaves_offset() {
        let test = TestContext::new();
        test.write_file("data.bin", b"0123456789");

        let handle = test
            .ctx
            .open("data.bin", OpenFlags::READ | OpenFlags::WRITE)
            .wait()
            .unwrap();
        assert_eq!(handle.pread(3, 4).wait().unwrap(), b"456");
        assert_eq!(handle.pwrite(b"xy", 8).wait().unwrap(), 2);
        assert_eq!(handle.offset(), Some(0));
        assert_eq!(handle.read(4).wait().unwrap(), b"0123");
        assert_eq!(handle.offset(), Some(4));
        handle.close().wait().unwrap();

        assert_eq!(test.read_file("data.bin"), b"01234567xy");
    }

    #[test]
    fn test_lseek() {
        let test = TestContext::new();
        test.write_file("seek.txt", b"hello world");
        let handle = test.ctx.open("seek.txt", OpenFlags::READ).wait().unwrap();

        assert_eq!(handle.lseek(-5, Whence::End).unwrap(), 6);
        assert_eq!(handle.read(16).wait().unwrap(), b"world");
        assert_eq!(handle.lseek(-11, Whence::Cur).unwrap(), 0);
        assert!(matches!(
            handle.lseek(-1, Whence::Cur),
            Err(Error::InvalidParameter(_))
        ));
        assert_eq!(handle.offset(), Some(0));

        // Seeking past the end is allowed; reading there is EOF
        assert_eq!(handle.lseek(100, Whence::Set).unwrap(), 100);
        assert!(handle.read(16).wait().unwrap().is_empty());
    }

    #[test]
    fn test_fstat_ftruncate_fsync() {
        let test = TestContext::new();
        test.write_file("sized.txt", b"some content");
        let handle = test
            .ctx
            .open("sized.txt", OpenFlags::READ | OpenFlags::WRITE)
            .wait()
            .unwrap();

        let st = handle.fstat().wait().unwrap();
        assert_eq!(st.size, 12);
        assert_eq!(st.file_type, FileType::File);
        assert!(!st.is_dir());
        assert_eq!(st.nlink, 1);

        handle.ftruncate(4).wait().unwrap();
        assert_eq!(handle.fstat().wait().unwrap().size, 4);
        assert_eq!(handle.lseek(0, Whence::End).unwrap(), 4);
        handle.fsync().wait().unwrap();
        handle.close().wait().unwrap();

        assert_eq!(test.read_file("sized.txt"), b"some");
    }

    #[test]
    fn test_close_is_idempotent() {
        let test = TestContext::new();
        test.write_file("once.txt", b"x");
        let handle = test.ctx.open("once.txt", OpenFlags::READ).wait().unwrap();
        let file_id = handle.file_id();
        assert!(test.ctx.file_handle_from_id(file_id).is_some());

        handle.close().wait().unwrap();
        assert!(!handle.is_open());
        assert_eq!(handle.path(), None);
        assert!(test.ctx.file_handle_from_id(file_id).is_none());
        handle.close().wait().unwrap();

        // Only one CLOSE reached the wire
        let closes = test
            .server
            .commands()
            .into_iter()
            .filter(|c| *c == crate::protocol::smb2_constants::Smb2Command::Close)
            .count();
        assert_eq!(closes, 1);
    }

    #[test]
    fn test_closed_handle_fails_locally() {
        let test = TestContext::new();
        test.write_file("gone.txt", b"x");
        let handle = test.ctx.open("gone.txt", OpenFlags::READ).wait().unwrap();
        let copy = test.ctx.file_handle_from_id(handle.file_id()).unwrap();
        handle.close().wait().unwrap();

        let err = copy.read(1).wait().unwrap_err();
        assert!(matches!(err, Error::InvalidHandle(_)));
        assert_eq!(err.errno(), Errno::EBADF);
        assert!(matches!(copy.write(b"x").wait(), Err(Error::InvalidHandle(_))));
        assert!(matches!(copy.fstat().wait(), Err(Error::InvalidHandle(_))));
        assert!(matches!(copy.lseek(0, Whence::Set), Err(Error::InvalidHandle(_))));
    }

    #[test]
    fn test_shared_handle_state() {
        let test = TestContext::new();
        test.write_file("shared.txt", b"abcdef");
        let handle = test.ctx.open("shared.txt", OpenFlags::READ).wait().unwrap();
        let other = test.ctx.file_handle_from_id(handle.file_id()).unwrap();

        assert_eq!(handle.read(2).wait().unwrap(), b"ab");
        assert_eq!(other.read(2).wait().unwrap(), b"cd");
        assert_eq!(handle.offset(), Some(4));
    }

    #[test]
    fn test_transfer_sizes_are_clamped() {
        let test = TestContext::with_options(ServerOptions {
            max_read_size: 1024,
            max_write_size: 512,
            ..ServerOptions::default()
        });
        assert_eq!(test.ctx.max_read_size(), 1024);
        assert_eq!(test.ctx.max_write_size(), 512);

        test.write_file("big.bin", &vec![7u8; 4096]);
        let handle = test
            .ctx
            .open("big.bin", OpenFlags::READ | OpenFlags::WRITE)
            .wait()
            .unwrap();
        assert_eq!(handle.read(4096).wait().unwrap().len(), 1024);
        assert_eq!(handle.pwrite(&[1u8; 2048], 0).wait().unwrap(), 512);
    }

    #[test]
    fn test_open_missing_file() {
        let test = TestContext::new();

        let err = test
            .ctx
            .open("missing.txt", OpenFlags::READ)
            .wait()
            .unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(err.errno(), Errno::ENOENT);
        assert!(
            test.ctx.error().starts_with("open missing.txt"),
            "unexpected error text: {}",
            test.ctx.error()
        );
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_open_missing_file_async() {
        let blocking = TestContext::new();
        let expected = blocking
            .ctx
            .open("missing.txt", OpenFlags::READ)
            .wait()
            .unwrap_err()
            .to_string();

        let local = tokio::task::LocalSet::new();
        local
            .run_until(async {
                let test = TestContext::new_async().await;

                let err = test
                    .ctx
                    .open("missing.txt", OpenFlags::READ)
                    .await
                    .unwrap_err();
                assert!(err.is_not_found());
                assert_eq!(err.nt_status(), Some(NtStatus::OBJECT_NAME_NOT_FOUND));
                assert_eq!(err.errno(), Errno::ENOENT);
                assert_eq!(err.to_string(), expected);
                assert_eq!(test.ctx.error(), expected);
                assert_eq!(test.ctx.connection().pending_calls(), 0);

                test.ctx.disconnect_share().await.unwrap();
            })
            .await;
    }

    #[test]
    fn test_exclusive_create() {
        let test = TestContext::new();
        test.write_file("taken.txt", b"x");

        let flags = OpenFlags::WRITE | OpenFlags::CREATE | OpenFlags::EXCLUSIVE;
        let err = test.ctx.open("taken.txt", flags).wait().unwrap_err();
        assert_eq!(err.nt_status(), Some(NtStatus::OBJECT_NAME_COLLISION));

        let handle = test.ctx.open("fresh.txt", flags).wait().unwrap();
        handle.close().wait().unwrap();
        assert!(test.path("fresh.txt").exists());
    }

    #[test]
    fn test_truncating_open() {
        let test = TestContext::new();
        test.write_file("old.txt", b"previous contents");

        let handle = test
            .ctx
            .open("old.txt", OpenFlags::WRITE | OpenFlags::TRUNCATE)
            .wait()
            .unwrap();
        assert_eq!(handle.lseek(0, Whence::End).unwrap(), 0);
        handle.write(b"new").wait().unwrap();
        handle.close().wait().unwrap();
        assert_eq!(test.read_file("old.txt"), b"new");
    }

    #[test]
    fn test_open_directory_as_file() {
        let test = TestContext::new();
        test.mkdir("folder");

        let err = test.ctx.open("folder", OpenFlags::READ).wait().unwrap_err();
        assert_eq!(err.nt_status(), Some(NtStatus::FILE_IS_A_DIRECTORY));
    }

    #[test]
    fn test_nested_path() {
        let test = TestContext::new();
        test.mkdir("a/b");

        let handle = test
            .ctx
            .open("/a/b/deep.txt", OpenFlags::WRITE | OpenFlags::CREATE)
            .wait()
            .unwrap();
        handle.write(b"deep").wait().unwrap();
        handle.close().wait().unwrap();
        assert_eq!(test.read_file("a/b/deep.txt"), b"deep");
    }
}
