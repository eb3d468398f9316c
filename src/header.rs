use crate::ascii::PERIOD;
use crate::config::Config;

const HTTP_PROTO: &str = "HTTP/1.0";

/// Content-Type
pub const RESP_HEAD_CONTENT_TYPE: &str = "Content-Type";
/// Referer
pub const REQ_HEAD_REFERER: &str = "Referer";

/// HTTP status code returned in a response.  Only the two statuses the server produces exist.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StatusCode {
    /// 200 OK
    OK,
    /// 404 Not Found
    NotFound,
}

impl StatusCode {
    const ALL: [Self; 2] = [Self::OK, Self::NotFound];

    /// Reason phrase including the numeric code, e.g. `404 Not Found`
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::OK => "200 OK",
            Self::NotFound => "404 Not Found",
        }
    }
}

/// Media type announced for a resource, chosen from the extension of its name.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ContentType {
    #[allow(missing_docs)]
    Html,
    #[allow(missing_docs)]
    Css,
    #[allow(missing_docs)]
    Png,
    #[allow(missing_docs)]
    Gif,
    #[allow(missing_docs)]
    Jpg,
    /// Anything unrecognised
    Binary,
}

impl ContentType {
    /// Match the extension of `name` (exact and case sensitive) against the known types.  Both
    /// script extensions from `config` are served as html.
    pub fn for_resource(name: &str, config: &Config) -> Self {
        let ext = match extension(name) {
            Some(ext) => ext,
            None => return Self::Binary,
        };

        match ext {
            "html" | "htm" => Self::Html,
            "css" => Self::Css,
            "png" => Self::Png,
            "gif" => Self::Gif,
            "jpg" => Self::Jpg,
            _ if ext == config.full_script_ext || ext == config.tag_script_ext => Self::Html,
            _ => Self::Binary,
        }
    }

    const ALL: [Self; 6] = [
        Self::Html,
        Self::Css,
        Self::Png,
        Self::Gif,
        Self::Jpg,
        Self::Binary,
    ];

    /// The media type value of the header
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Html => "text/html",
            Self::Css => "text/css",
            Self::Png => "image/png",
            Self::Gif => "image/gif",
            Self::Jpg => "image/jpeg",
            Self::Binary => "application/octet-stream",
        }
    }
}

/// The part of `name` after its last `.`, if the final path segment has one.
pub(crate) fn extension(name: &str) -> Option<&str> {
    let file = name.rsplit('/').next().unwrap_or(name);
    let dot = file.bytes().rposition(|b| b == PERIOD)?;
    Some(&file[dot + 1..])
}

/// Longest head the server ever produces, so [`write_head`] always fits.
pub(crate) const MAX_HEAD_LEN: usize = max_head_len();

const fn max_head_len() -> usize {
    let mut status = 0;
    let mut i = 0;
    while i < StatusCode::ALL.len() {
        let len = StatusCode::ALL[i].as_str().len();
        if len > status {
            status = len;
        }
        i += 1;
    }

    let mut content_type = 0;
    let mut i = 0;
    while i < ContentType::ALL.len() {
        let len = ContentType::ALL[i].as_str().len();
        if len > content_type {
            content_type = len;
        }
        i += 1;
    }

    // "<proto> <status>\r\n<Content-Type>: <type>\r\n\r\n"
    HTTP_PROTO.len() + 1 + status + 2 + RESP_HEAD_CONTENT_TYPE.len() + 2 + content_type + 4
}

/// Render the status line, the Content-Type line and the blank line terminating the head.
pub(crate) fn write_head(
    head: &mut heapless::String<MAX_HEAD_LEN>,
    status: StatusCode,
    content_type: ContentType,
) {
    head.clear();
    for part in [
        HTTP_PROTO,
        " ",
        status.as_str(),
        "\r\n",
        RESP_HEAD_CONTENT_TYPE,
        ": ",
        content_type.as_str(),
        "\r\n\r\n",
    ] {
        // cannot fail, the buffer holds the longest head
        let _ = head.push_str(part);
    }
}
