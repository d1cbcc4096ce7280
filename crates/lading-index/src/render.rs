use askama::Template;
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};

/// Landing page text for a store without packages.
pub const NOTHING_UPLOADED: &str = "Nothing to see here yet, try uploading a package!";

/// Characters that can't appear verbatim in one segment of a link. Anything HTML-special is
/// included too, so encoded links go into templates unescaped.
const SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'&')
    .add(b'\'')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}')
    .add(b'/');

/// Absolute link below `/packages`, e.g. `["foo", "1.0", "foo-1.0.tar.gz"]` for a download.
#[must_use]
pub fn package_href(segments: &[&str]) -> String {
    let mut href = String::from("/packages");
    for segment in segments {
        href.push('/');
        href.extend(utf8_percent_encode(segment, SEGMENT));
    }
    href
}

pub(crate) fn dir_href(segments: &[&str]) -> String {
    let mut href = package_href(segments);
    href.push('/');
    href
}

pub(crate) struct Link {
    pub href: String,
    pub text: String,
}

pub(crate) struct Section {
    pub name: String,
    pub links: Vec<Link>,
}

#[derive(Template)]
#[template(path = "links.html")]
pub(crate) struct LinksPage<'a> {
    pub title: &'a str,
    pub links: Vec<Link>,
}

#[derive(Template)]
#[template(path = "full_index.html")]
pub(crate) struct FullIndexPage<'a> {
    pub title: &'a str,
    pub sections: Vec<Section>,
}
