//! Path operations: each one is a CREATE/…/CLOSE compound

use super::test_context::TestContext;
use crate::client::FileType;
use crate::protocol::smb2_constants::Smb2Command;
use crate::protocol::NtStatus;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stat() {
        let test = TestContext::new();
        test.write_file("file.txt", b"twelve bytes");
        test.mkdir("dir");

        let st = test.ctx.stat("file.txt").wait().unwrap();
        assert_eq!(st.file_type, FileType::File);
        assert_eq!(st.size, 12);
        assert!(st.mtime.timestamp() > 0);

        let st = test.ctx.stat("/dir").wait().unwrap();
        assert!(st.is_dir());

        // One frame per stat: CREATE, QUERY_INFO and CLOSE back to back
        let commands = test.server.commands();
        let tail = &commands[commands.len() - 3..];
        assert_eq!(
            tail,
            &[Smb2Command::Create, Smb2Command::QueryInfo, Smb2Command::Close]
        );
    }

    #[test]
    fn test_stat_missing() {
        let test = TestContext::new();

        let err = test.ctx.stat("nowhere.txt").wait().unwrap_err();
        assert!(err.is_not_found());
        assert!(err.to_string().starts_with("stat nowhere.txt"));
        assert_eq!(test.ctx.connection().pending_calls(), 0);
    }

    #[test]
    fn test_statvfs() {
        let test = TestContext::new();

        let vfs = test.ctx.statvfs("").wait().unwrap();
        assert_eq!(vfs.bsize, 4096);
        assert_eq!(vfs.frsize, 4096);
        assert_eq!(vfs.blocks, 1000);
        assert_eq!(vfs.bfree, 500);
        assert_eq!(vfs.bavail, 400);
        assert_eq!(vfs.namemax, 255);
    }

    #[test]
    fn test_truncate() {
        let test = TestContext::new();
        test.write_file("long.txt", b"0123456789");

        test.ctx.truncate("long.txt", 3).wait().unwrap();
        assert_eq!(test.read_file("long.txt"), b"012");

        test.ctx.truncate("long.txt", 6).wait().unwrap();
        assert_eq!(test.read_file("long.txt"), b"012\0\0\0");
    }

    #[test]
    fn test_rename() {
        let test = TestContext::new();
        test.write_file("before.txt", b"payload");
        test.mkdir("sub");

        test.ctx.rename("before.txt", "sub/after.txt").wait().unwrap();
        assert!(!test.path("before.txt").exists());
        assert_eq!(test.read_file("sub/after.txt"), b"payload");
    }

    #[test]
    fn test_rename_does_not_replace() {
        let test = TestContext::new();
        test.write_file("one.txt", b"1");
        test.write_file("two.txt", b"2");

        let err = test.ctx.rename("one.txt", "two.txt").wait().unwrap_err();
        assert_eq!(err.nt_status(), Some(NtStatus::OBJECT_NAME_COLLISION));
        assert!(err.to_string().starts_with("rename one.txt"));
        assert_eq!(test.read_file("one.txt"), b"1");
        assert_eq!(test.read_file("two.txt"), b"2");
    }

    #[test]
    fn test_unlink() {
        let test = TestContext::new();
        test.write_file("doomed.txt", b"x");
        test.mkdir("folder");

        test.ctx.unlink("doomed.txt").wait().unwrap();
        assert!(!test.path("doomed.txt").exists());

        let err = test.ctx.unlink("doomed.txt").wait().unwrap_err();
        assert!(err.is_not_found());

        let err = test.ctx.unlink("folder").wait().unwrap_err();
        assert_eq!(err.nt_status(), Some(NtStatus::FILE_IS_A_DIRECTORY));
        assert!(test.path("folder").is_dir());
    }

    #[test]
    fn test_mkdir_rmdir() {
        let test = TestContext::new();

        test.ctx.mkdir("made").wait().unwrap();
        assert!(test.path("made").is_dir());

        let err = test.ctx.mkdir("made").wait().unwrap_err();
        assert_eq!(err.nt_status(), Some(NtStatus::OBJECT_NAME_COLLISION));

        test.ctx.rmdir("made").wait().unwrap();
        assert!(!test.path("made").exists());
    }

    #[test]
    fn test_rmdir_refuses() {
        let test = TestContext::new();
        test.mkdir("full");
        test.write_file("full/child.txt", b"x");
        test.write_file("plain.txt", b"x");

        let err = test.ctx.rmdir("full").wait().unwrap_err();
        assert_eq!(err.nt_status(), Some(NtStatus::DIRECTORY_NOT_EMPTY));
        assert!(test.path("full/child.txt").exists());

        let err = test.ctx.rmdir("plain.txt").wait().unwrap_err();
        assert_eq!(err.nt_status(), Some(NtStatus::NOT_A_DIRECTORY));
    }
}
