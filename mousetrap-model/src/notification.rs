use crate::EpochMillis;
use crate::scan::ScanResult;

/// Machine-readable error codes sent in error notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    FileNotExist,
}

impl ErrorCode {
    pub fn code(&self) -> &'static str {
        match self {
            ErrorCode::FileNotExist => "FILE_NOT_EXIST",
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            ErrorCode::FileNotExist => {
                "file does not exist in specified location"
            }
        }
    }
}

/// Payload published when a scan reaches a terminal state.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct ScanNotification {
    pub file_path: String,
    pub scan_result: ScanResult,
    pub viruses: Vec<String>,
    pub timestamp: EpochMillis,
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
}

/// Payload published when a request cannot be processed at all.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct ErrorNotification {
    pub file_path: String,
    pub error: ErrorDetail,
    pub timestamp: EpochMillis,
}

impl ErrorNotification {
    pub fn new(
        file_path: impl Into<String>,
        code: ErrorCode,
        timestamp: EpochMillis,
    ) -> Self {
        Self {
            file_path: file_path.into(),
            error: ErrorDetail {
                code: code.code().to_string(),
                message: code.message().to_string(),
            },
            timestamp,
        }
    }
}

#[cfg(all(test, feature = "serde"))]
mod tests {
    use super::*;

    #[test]
    fn scan_notification_uses_wire_names() {
        let payload = ScanNotification {
            file_path: "s3://bucket/b.csv".into(),
            scan_result: ScanResult::Infected,
            viruses: vec!["Eicar-Test-Signature".into()],
            timestamp: 42,
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["filePath"], "s3://bucket/b.csv");
        assert_eq!(json["scanResult"], "INFECTED");
        assert_eq!(json["viruses"][0], "Eicar-Test-Signature");
    }

    #[test]
    fn error_notification_nests_code_and_message() {
        let payload =
            ErrorNotification::new("s3://bucket/x", ErrorCode::FileNotExist, 7);
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["error"]["code"], "FILE_NOT_EXIST");
        assert_eq!(
            json["error"]["message"],
            "file does not exist in specified location"
        );
    }
}
