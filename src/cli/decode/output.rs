use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::Serialize;
use ttx::process::decode::{Decoder, NavigationLinks};
use ttx::process::elements::ParseFlags;
use ttx::process::toptext::TopLink;
use ttx::structs::page::Page;

use super::render::render_page;
use crate::cli::command::DumpFormat;

pub fn create_path_with_extension(base_path: &Path, expected_ext: &str) -> PathBuf {
    match base_path.extension() {
        Some(existing_ext) if existing_ext == expected_ext => base_path.to_path_buf(),
        Some(_) => {
            let mut name = base_path.file_name().unwrap_or_default().to_os_string();
            name.push(".");
            name.push(expected_ext);
            base_path.with_file_name(name)
        }
        None => base_path.with_extension(expected_ext),
    }
}

fn top_link_label(link: &TopLink) -> String {
    match link {
        TopLink::Back => "back".to_string(),
        TopLink::Page { page, title: Some(title) } => format!("{page:03X} {}", title.trim_end()),
        TopLink::Page { page, title: None } => format!("{page:03X}"),
        TopLink::Waiting { .. } => "...".to_string(),
        TopLink::None => "---".to_string(),
    }
}

/// Serialized form of one page in a YAML dump.
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct PageDump {
    pub page: String,
    pub subcode: String,
    pub control_bits: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub links: Vec<String>,
    pub rows: Vec<String>,
}

impl PageDump {
    pub fn new(page: &Page, links: &NavigationLinks) -> Self {
        let links = match links {
            NavigationLinks::Flof(codes) => codes
                .iter()
                .map(|code| {
                    code.map_or_else(|| "---".to_string(), |code| format!("{:03X}", code.page))
                })
                .collect(),
            NavigationLinks::Top(nav) => [&nav.red, &nav.green, &nav.yellow, &nav.blue]
                .into_iter()
                .map(top_link_label)
                .collect(),
            NavigationLinks::None => Vec::new(),
        };

        let rows = render_page(page, ParseFlags(ParseFlags::FORCE_HEADER))
            .into_iter()
            .map(|row| row.trim_end().to_string())
            .collect();

        Self {
            page: format!("{:03X}", page.code.page),
            subcode: format!("{:04X}", page.code.subcode),
            control_bits: format!("{:#06X}", page.control.0),
            links,
            rows,
        }
    }

    fn write_text<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writeln!(writer, "=== P{}/{} ===", self.page, self.subcode)?;
        for row in &self.rows {
            writeln!(writer, "{row}")?;
        }
        if !self.links.is_empty() {
            writeln!(writer, "links: {}", self.links.join(" "))?;
        }
        writeln!(writer)
    }
}

/// Opens the dump destination: a file (extension added from the format) or stdout.
pub fn create_writer(path: Option<&Path>, format: DumpFormat) -> Result<Box<dyn Write>> {
    match path {
        Some(path) => {
            let ext = match format {
                DumpFormat::Text => "txt",
                DumpFormat::Yaml => "yaml",
            };
            let path = create_path_with_extension(path, ext);
            log::info!("Writing pages to {}", path.display());
            Ok(Box::new(BufWriter::new(File::create(path)?)))
        }
        None => Ok(Box::new(BufWriter::new(io::stdout().lock()))),
    }
}

pub fn write_page<W: Write>(writer: &mut W, dump: &PageDump, format: DumpFormat) -> Result<()> {
    match format {
        DumpFormat::Text => dump.write_text(writer)?,
        DumpFormat::Yaml => {
            writeln!(writer, "---")?;
            serde_yaml_ng::to_writer(&mut *writer, dump)?;
        }
    }
    Ok(())
}

/// Writes every received page and sub-page in page order; returns the count.
pub fn write_dump<W: Write>(
    writer: &mut W,
    decoder: &Decoder,
    format: DumpFormat,
) -> Result<usize> {
    let mut codes = decoder.received_page_codes();
    codes.sort();

    let mut written = 0;
    for code in codes {
        let Some(page) = decoder.get_display_page(code) else {
            log::debug!("Page {code} left the cache before it was written");
            continue;
        };
        let dump = PageDump::new(&page, &decoder.navigation_links(&page));
        write_page(writer, &dump, format)?;
        written += 1;
    }

    writer.flush()?;
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ttx::structs::page::PageCode;

    #[test]
    fn output_extension_is_added_once() {
        assert_eq!(
            create_path_with_extension(Path::new("out/pages"), "yaml"),
            PathBuf::from("out/pages.yaml")
        );
        assert_eq!(
            create_path_with_extension(Path::new("pages.yaml"), "yaml"),
            PathBuf::from("pages.yaml")
        );
        assert_eq!(
            create_path_with_extension(Path::new("capture.ts"), "txt"),
            PathBuf::from("capture.ts.txt")
        );
    }

    fn sample_page() -> Page {
        let mut page = Page::new(PageCode::new(0x123, 0x0001));
        page.frame[0][8..14].copy_from_slice(b"HEADER");
        page.frame[1][..5].copy_from_slice(b"HELLO");
        page
    }

    #[test]
    fn text_dump_lists_rows() {
        let dump = PageDump::new(&sample_page(), &NavigationLinks::None);
        let mut out = Vec::new();
        write_page(&mut out, &dump, DumpFormat::Text).unwrap();

        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "=== P123/0001 ===");
        assert_eq!(lines[1], "        HEADER");
        assert_eq!(lines[2], "HELLO");
        assert_eq!(lines.len(), 1 + 25 + 1);
    }

    #[test]
    fn yaml_dump_carries_links() {
        let links = NavigationLinks::Flof([
            Some(PageCode::any(0x200)),
            None,
            None,
            Some(PageCode::any(0x888)),
        ]);
        let dump = PageDump::new(&sample_page(), &links);
        let mut out = Vec::new();
        write_page(&mut out, &dump, DumpFormat::Yaml).unwrap();

        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("---\npage: '123'\n"));
        assert!(text.contains("links:\n- '200'\n"));
        assert!(text.contains("- '888'\nrows:\n"));
        assert!(text.contains("- HELLO\n"));
    }
}
