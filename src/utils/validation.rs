use crate::error::{Error, Result};
use url::Url;

/// Video interviews require an https meeting link.
pub fn require_https_url(raw: &str) -> Result<()> {
    let url = Url::parse(raw)
        .map_err(|_| Error::InvalidSchedule(format!("Invalid meeting link '{}'", raw)))?;
    if url.scheme() != "https" {
        return Err(Error::InvalidSchedule(
            "Meeting link must be an https URL".to_string(),
        ));
    }
    Ok(())
}
