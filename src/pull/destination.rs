//! Compute the path where a pulled image is written.

use std::path::{Component, Path, PathBuf};

use crate::{reference::ParseError, PullRequest, Reference, TransportKind};

/// Final path for the image of `request`.
///
/// The base name is taken from the first available source:
///
/// 1. The explicit name of the request.
/// 2. The name given as a positional argument.
/// 3. A name derived from the reference.
///
/// The base name is joined to the output directory, if any, even when it
/// is an absolute path. This function does not access the filesystem.
pub fn resolve(request: &PullRequest) -> Result<PathBuf, ParseError> {
    let base_name = match (request.get_explicit_name(), request.get_name_argument()) {
        (Some(name), _) | (None, Some(name)) => name.to_owned(),
        (None, None) => derive_name(&Reference::try_from(request.reference())?)?,
    };

    if base_name.is_empty() {
        return Err(ParseError::MissingName(request.reference().to_owned()));
    }

    let path = match request.get_output_dir() {
        Some(dir) if !dir.as_os_str().is_empty() => {
            // Absolute names are placed inside the output directory.
            let relative: PathBuf = Path::new(&base_name)
                .components()
                .filter(|c| !matches!(c, Component::RootDir | Component::Prefix(_)))
                .collect();

            if relative.as_os_str().is_empty() {
                return Err(ParseError::MissingName(request.reference().to_owned()));
            }

            dir.join(relative)
        }

        _ => PathBuf::from(base_name),
    };

    Ok(path)
}

/// Base name for an image, derived from its reference.
fn derive_name(reference: &Reference<'_>) -> Result<String, ParseError> {
    let name = match reference.transport {
        TransportKind::LibraryDefault => {
            // Bare names get the same name as `library://` references.
            let source = format!("library://{}", reference.source);
            return derive_name(&Reference::try_from(source.as_str())?);
        }

        kind if kind.is_http() => url_basename(reference.remainder),

        _ => image_basename(reference.remainder),
    };

    match name.as_str() {
        "" | "." | ".." => Err(ParseError::MissingName(reference.source.to_owned())),
        _ => Ok(name),
    }
}

/// Last segment in the path of a URL, without the scheme.
fn url_basename(remainder: &str) -> String {
    let end = remainder.find(['?', '#']).unwrap_or(remainder.len());

    let path = match remainder[..end].split_once('/') {
        Some((_host, path)) => path,
        None => "",
    };

    path.rsplit('/').next().unwrap_or_default().to_owned()
}

/// Last segment of an image name, with the tag separated by `_`.
fn image_basename(remainder: &str) -> String {
    let name = remainder.rsplit('/').next().unwrap_or(remainder);

    let name = match name.split_once('@') {
        Some((name, _digest)) => name,
        None => name,
    };

    match name.split_once(':') {
        Some((name, "")) => name.to_owned(),
        Some((name, tag)) => format!("{name}_{tag}"),
        None => name.to_owned(),
    }
}
