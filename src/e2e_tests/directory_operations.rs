//! Directory listing tests

use super::test_context::TestContext;
use crate::client::FileType;
use crate::protocol::NtStatus;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_root() {
        let test = TestContext::new();
        test.write_file("alpha.txt", b"a");
        test.write_file("beta.txt", b"bb");
        test.mkdir("gamma");

        let mut dir = test.ctx.opendir("").wait().unwrap();
        assert_eq!(dir.len(), 3);

        let names: Vec<String> = dir.entries().iter().map(|e| e.name.clone()).collect();
        assert_eq!(names, ["alpha.txt", "beta.txt", "gamma"]);

        let first = dir.read().unwrap();
        assert_eq!(first.name, "alpha.txt");
        assert_eq!(first.stat.size, 1);
        assert_eq!(first.stat.file_type, FileType::File);

        dir.seek(2);
        let last = dir.read().unwrap();
        assert_eq!(last.name, "gamma");
        assert!(last.stat.is_dir());
        assert!(dir.read().is_none());
        assert_eq!(dir.tell(), 3);

        dir.rewind();
        assert_eq!(dir.read().map(|e| e.name.as_str()), Some("alpha.txt"));

        dir.close();
        assert!(dir.read().is_none());

        // The wire handle is already gone
        assert_eq!(test.ctx.connection().pending_calls(), 0);
    }

    #[test]
    fn test_list_subdirectory() {
        let test = TestContext::new();
        test.mkdir("docs/inner");
        test.write_file("docs/readme.md", b"# hi");

        let mut dir = test.ctx.opendir("/docs/").wait().unwrap();
        let mut seen = Vec::new();
        while let Some(entry) = dir.read() {
            seen.push((entry.name.clone(), entry.stat.file_type));
        }
        assert_eq!(
            seen,
            [
                ("inner".to_string(), FileType::Directory),
                ("readme.md".to_string(), FileType::File),
            ]
        );
    }

    #[test]
    fn test_list_empty() {
        let test = TestContext::new();
        test.mkdir("empty");

        let dir = test.ctx.opendir("empty").wait().unwrap();
        assert!(dir.is_empty());
    }

    #[test]
    fn test_opendir_errors() {
        let test = TestContext::new();
        test.write_file("file.txt", b"x");

        let err = test.ctx.opendir("file.txt").wait().unwrap_err();
        assert_eq!(err.nt_status(), Some(NtStatus::NOT_A_DIRECTORY));
        assert!(err.to_string().starts_with("opendir file.txt"));

        let err = test.ctx.opendir("nope").wait().unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(test.ctx.connection().pending_calls(), 0);
    }
}
