//! Split a reference in its scheme and remainder.

use super::*;

type Result<T> = std::result::Result<T, ParseError>;

pub(super) fn parse(reference: &str) -> Result<Reference<'_>> {
    if reference.is_empty() {
        return Err(ParseError::Empty);
    }

    // `alpine:3.9` has a `:`, but it is a tag, not a scheme.
    let (scheme, remainder) = match reference.split_once(':') {
        Some((scheme, tail)) => match tail.strip_prefix("//") {
            Some(remainder) => (Some(scheme), remainder),
            None => (None, reference),
        },

        None => (None, reference),
    };

    let transport = match scheme {
        None => TransportKind::LibraryDefault,
        Some("") => return Err(ParseError::MissingScheme(reference.to_owned())),
        Some(s) => TransportKind::from_scheme(s),
    };

    if remainder.is_empty() {
        return Err(ParseError::MissingRemainder(reference.to_owned()));
    }

    Ok(Reference {
        source: reference,
        transport,
        scheme,
        remainder,
    })
}

#[test]
fn parse_valid_references() {
    macro_rules! check {
        ($reference:expr, [ $transport:expr, $scheme:expr, $remainder:expr ]) => {
            assert_eq!(
                Reference::try_from($reference).unwrap(),
                Reference {
                    source: $reference,
                    transport: $transport,
                    scheme: $scheme,
                    remainder: $remainder,
                }
            )
        };
    }

    use TransportKind::*;

    check!("alpine", [LibraryDefault, None, "alpine"]);
    check!("alpine:3.9", [LibraryDefault, None, "alpine:3.9"]);
    check!("user/col/img:1", [LibraryDefault, None, "user/col/img:1"]);
    check!("library://foo", [Library, Some("library"), "foo"]);
    check!("shub://user/img", [Hub, Some("shub"), "user/img"]);
    check!("oras://ex.com/a:1", [Oras, Some("oras"), "ex.com/a:1"]);
    check!("http://ex.com/a.sif", [Http, Some("http"), "ex.com/a.sif"]);
    check!("https://ex.com/a.sif", [Https, Some("https"), "ex.com/a.sif"]);
    check!("docker://alpine", [OciRegistry, Some("docker"), "alpine"]);
    check!("oci-archive://a.tar", [OciRegistry, Some("oci-archive"), "a.tar"]);
    check!("bogus://x", [Unsupported, Some("bogus"), "x"]);
}

#[test]
fn reject_malformed_references() {
    assert_eq!(Reference::try_from(""), Err(ParseError::Empty));

    assert_eq!(
        Reference::try_from("library://"),
        Err(ParseError::MissingRemainder("library://".into()))
    );

    assert_eq!(
        Reference::try_from("bogus://"),
        Err(ParseError::MissingRemainder("bogus://".into()))
    );

    assert_eq!(
        Reference::try_from("://foo"),
        Err(ParseError::MissingScheme("://foo".into()))
    );
}

#[test]
fn bare_names_keep_whole_input() {
    for input in ["foo", "foo:bar", "a/b/c", "foo:/bar", "x@sha256:00"] {
        let reference = Reference::try_from(input).unwrap();
        assert_eq!(reference.transport, TransportKind::LibraryDefault);
        assert_eq!(reference.remainder, input);
        assert_eq!(reference.scheme, None);
    }
}
