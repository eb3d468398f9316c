use crate::config::Config;
use crate::header::{ContentType, StatusCode, extension};
use crate::store::{ContentStore, StoreError};

/// How the body of a response is produced
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BodyKind {
    /// The resource bytes as they are
    Verbatim,
    /// The output of running the whole resource as a script on a fresh engine instance
    FullScript,
    /// Literal bytes interleaved with the output of marker delimited script regions
    Tagged,
}

impl BodyKind {
    /// Choose from the extension of `name`
    pub fn for_resource(name: &str, config: &Config) -> Self {
        match extension(name) {
            Some(ext) if ext == config.full_script_ext => Self::FullScript,
            Some(ext) if ext == config.tag_script_ext => Self::Tagged,
            _ => Self::Verbatim,
        }
    }
}

/// The dispatcher's decision for one request
pub(crate) struct Response<H> {
    pub(crate) status: StatusCode,
    pub(crate) content_type: ContentType,
    pub(crate) body: BodyKind,
    /// `None` only when even the not-found resource could not be opened
    pub(crate) content: Option<H>,
}

fn open_checked<S: ContentStore>(
    store: &mut S,
    name: &str,
    config: &Config,
) -> Result<S::Handle, StoreError> {
    let handle = store.open(name)?;

    if store.len(&handle) > config.max_resource_size {
        store.release(handle);
        return Err(StoreError::ResourceTooLarge);
    }

    Ok(handle)
}

/// Decide how to answer a request for `path`.  A resource that cannot be served is replaced by the
/// not-found resource and a 404 status; the response goes ahead either way.
pub(crate) fn dispatch<S: ContentStore>(
    store: &mut S,
    path: &str,
    config: &Config,
) -> Response<S::Handle> {
    let (status, name, content) = match open_checked(store, path, config) {
        Ok(handle) => (StatusCode::OK, path, Some(handle)),
        Err(e) => {
            debug!("{} cannot be served: {}", path, e);
            match open_checked(store, config.not_found, config) {
                Ok(handle) => (StatusCode::NotFound, config.not_found, Some(handle)),
                Err(e) => {
                    warn!("not found resource {} unavailable: {}", config.not_found, e);
                    (StatusCode::NotFound, config.not_found, None)
                }
            }
        }
    };

    Response {
        status,
        content_type: ContentType::for_resource(name, config),
        body: BodyKind::for_resource(name, config),
        content,
    }
}
