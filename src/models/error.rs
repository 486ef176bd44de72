/// A wire frame that failed to decode. Policy is to drop the single frame
/// and keep processing the stream, never to terminate the connection.
#[derive(Debug)]
pub enum MessageError {
    Malformed(serde_json::Error),
}

impl std::fmt::Display for MessageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageError::Malformed(e) => write!(f, "Malformed message: {}", e),
        }
    }
}

impl std::error::Error for MessageError {}
