use url::Url;

/// Classification of a scene's image reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageLocation<'a> {
    /// No image, or the image was dropped after a permanent fetch failure.
    Absent,
    /// Still on the remote host; hydration will try to fetch it.
    Remote(&'a str),
    /// Already on disk.
    Local(&'a str),
}

impl<'a> ImageLocation<'a> {
    pub fn of(reference: Option<&'a str>) -> Self {
        match reference {
            None => Self::Absent,
            Some(r) if is_local_reference(r) => Self::Local(r),
            Some(r) => Self::Remote(r),
        }
    }
}

/// True for `file://` URLs and plain filesystem paths.
///
/// Anything that parses as a URL with another scheme counts as remote, so a
/// Windows drive letter (`C:\...`) is the one scheme-like prefix treated as a path.
pub fn is_local_reference(reference: &str) -> bool {
    match Url::parse(reference) {
        Ok(url) => url.scheme() == "file" || url.scheme().len() == 1,
        Err(_) => true,
    }
}
