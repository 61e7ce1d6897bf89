//! YAML parsing and writing with error handling

use serde::{de::DeserializeOwned, Serialize};

use crate::yaml::diagnostics::{YamlError, YamlSyntaxError};

/// Parse YAML content into a typed value with nice error messages
pub fn parse_yaml<T: DeserializeOwned + 'static>(content: &str, filename: &str) -> Result<T, YamlError> {
    serde_yml::from_str(content).map_err(|e| {
        YamlError::Syntax(YamlSyntaxError::from_serde_error(&e, content, filename))
    })
}

/// Parse YAML from a file path
pub fn parse_yaml_file<T: DeserializeOwned + 'static>(path: &std::path::Path) -> Result<T, YamlError> {
    let content = std::fs::read_to_string(path)?;
    let filename = path.display().to_string();
    parse_yaml(&content, &filename)
}

/// Serialize a value and write it to a file, replacing the previous contents
pub fn write_yaml_file<T: Serialize>(path: &std::path::Path, value: &T) -> Result<(), YamlError> {
    let contents = serde_yml::to_string(value).map_err(|e| YamlError::Serialize {
        message: e.to_string(),
    })?;
    std::fs::write(path, contents)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::tempdir;

    #[derive(Debug, Deserialize, Serialize, PartialEq)]
    struct TestStruct {
        name: String,
        value: i32,
    }

    #[test]
    fn test_parse_valid_yaml() {
        let yaml = "name: test\nvalue: 42";
        let result: TestStruct = parse_yaml(yaml, "test.yaml").unwrap();
        assert_eq!(result.name, "test");
        assert_eq!(result.value, 42);
    }

    #[test]
    fn test_parse_invalid_yaml_returns_error() {
        let yaml = "name: test\n  invalid indentation";
        let result: Result<TestStruct, _> = parse_yaml(yaml, "test.yaml");
        assert!(result.is_err());
    }

    #[test]
    fn test_syntax_error_carries_filename() {
        let yaml = "name: test\nvalue: not-a-number\n";
        let err = parse_yaml::<TestStruct>(yaml, "sub.yaml").unwrap_err();
        match err {
            YamlError::Syntax(e) => {
                assert_eq!(e.filename, "sub.yaml");
                assert!(e.to_string().contains("sub.yaml"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_write_then_parse_file() {
        let tmp = tempdir().unwrap();
        let file = tmp.path().join("out.yaml");
        let value = TestStruct {
            name: "x".to_string(),
            value: 7,
        };
        write_yaml_file(&file, &value).unwrap();
        let back: TestStruct = parse_yaml_file(&file).unwrap();
        assert_eq!(back, value);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let result: Result<TestStruct, _> =
            parse_yaml_file(std::path::Path::new("/nonexistent/nope.yaml"));
        assert!(matches!(result, Err(YamlError::Io(_))));
    }
}
