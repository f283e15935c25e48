//! Export format catalogue and native content types
//!
//! The document service stores some items in native, non-binary formats
//! ([`NativeKind`]) that must be converted on the way out. Every other item is
//! downloaded as-is ([`ExportFormat::Native`]).

use serde::{Deserialize, Serialize};

/// Content type of a folder
pub const FOLDER_TYPE: &str = "application/vnd.google-apps.folder";

/// Content type of the synthetic root that query-backed trees hang off
pub const ROOT_TYPE: &str = "virtual/root";

/// Content type of forms (never exportable, excluded from listings)
pub const FORM_TYPE: &str = "application/vnd.google-apps.form";

/// Content type of shortcuts (excluded from listings)
pub const SHORTCUT_TYPE: &str = "application/vnd.google-apps.shortcut";

/// Whether a content type denotes a folder (real or synthetic root)
pub fn is_folder_type(content_type: &str) -> bool {
    content_type == FOLDER_TYPE || content_type == ROOT_TYPE
}

/// Native document kinds that need converting on export
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NativeKind {
    /// Word-processing document
    Document,
    /// Multi-sheet spreadsheet
    Spreadsheet,
    /// Multi-page presentation
    Presentation,
    /// Drawing
    Drawing,
    /// Whiteboard
    Jamboard,
}

impl NativeKind {
    /// All native kinds
    pub const ALL: [NativeKind; 5] = [
        NativeKind::Document,
        NativeKind::Spreadsheet,
        NativeKind::Presentation,
        NativeKind::Drawing,
        NativeKind::Jamboard,
    ];

    /// The service content type for this kind
    pub fn content_type(&self) -> &'static str {
        match self {
            NativeKind::Document => "application/vnd.google-apps.document",
            NativeKind::Spreadsheet => "application/vnd.google-apps.spreadsheet",
            NativeKind::Presentation => "application/vnd.google-apps.presentation",
            NativeKind::Drawing => "application/vnd.google-apps.drawing",
            NativeKind::Jamboard => "application/vnd.google-apps.jam",
        }
    }

    /// Look up the kind for a content type
    pub fn from_content_type(content_type: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.content_type() == content_type)
    }

    /// Formats the service can convert this kind into, preferred first
    pub fn formats(&self) -> &'static [ExportFormat] {
        use ExportFormat::*;
        match self {
            NativeKind::Document => &[Docx, Odt, Pdf, Markdown, Txt, Html, ZipHtml, Epub],
            NativeKind::Spreadsheet => &[Xlsx, Ods, Pdf, Csv, Tsv, Html, ZipHtml],
            NativeKind::Presentation => &[Pptx, Odp, Pdf, Png, Txt],
            NativeKind::Drawing => &[Png, Jpeg, Svg, Pdf],
            NativeKind::Jamboard => &[Pdf],
        }
    }

    /// Default export format for this kind
    pub fn default_format(&self) -> ExportFormat {
        match self {
            NativeKind::Document => ExportFormat::Docx,
            NativeKind::Spreadsheet => ExportFormat::Xlsx,
            NativeKind::Presentation => ExportFormat::Pptx,
            NativeKind::Drawing => ExportFormat::Png,
            NativeKind::Jamboard => ExportFormat::Pdf,
        }
    }
}

/// Output format an item is exported into
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportFormat {
    /// Microsoft Word
    Docx,
    /// Microsoft Excel
    Xlsx,
    /// Microsoft PowerPoint
    Pptx,
    /// OpenDocument text
    Odt,
    /// OpenDocument spreadsheet
    Ods,
    /// OpenDocument presentation
    Odp,
    /// PDF
    Pdf,
    /// PNG image
    Png,
    /// JPEG image
    Jpeg,
    /// SVG vector image
    Svg,
    /// Plain text
    Txt,
    /// HTML
    Html,
    /// Comma-separated values
    Csv,
    /// Tab-separated values
    Tsv,
    /// Markdown
    Markdown,
    /// Zipped HTML archive
    ZipHtml,
    /// EPUB
    Epub,
    /// Keep the source's own binary; no conversion
    #[default]
    Native,
}

impl ExportFormat {
    /// Every format in catalogue order
    pub const ALL: [ExportFormat; 18] = [
        ExportFormat::Docx,
        ExportFormat::Xlsx,
        ExportFormat::Pptx,
        ExportFormat::Odt,
        ExportFormat::Ods,
        ExportFormat::Odp,
        ExportFormat::Pdf,
        ExportFormat::Png,
        ExportFormat::Jpeg,
        ExportFormat::Svg,
        ExportFormat::Txt,
        ExportFormat::Html,
        ExportFormat::Csv,
        ExportFormat::Tsv,
        ExportFormat::Markdown,
        ExportFormat::ZipHtml,
        ExportFormat::Epub,
        ExportFormat::Native,
    ];

    /// Label shown to users when picking a format
    pub fn label(&self) -> &'static str {
        match self {
            ExportFormat::Docx => "Microsoft Word (.docx)",
            ExportFormat::Xlsx => "Microsoft Excel (.xlsx)",
            ExportFormat::Pptx => "Microsoft PowerPoint (.pptx)",
            ExportFormat::Odt => "Open Document Text (.odt)",
            ExportFormat::Ods => "Open Document Spreadsheet (.ods)",
            ExportFormat::Odp => "Open Document Presentation (.odp)",
            ExportFormat::Pdf => "PDF (.pdf)",
            ExportFormat::Png => "PNG Image (.png)",
            ExportFormat::Jpeg => "JPEG Image (.jpg)",
            ExportFormat::Svg => "SVG Vector (.svg)",
            ExportFormat::Txt => "Plain Text (.txt)",
            ExportFormat::Html => "HTML (.html)",
            ExportFormat::Csv => "CSV (.csv)",
            ExportFormat::Tsv => "TSV (.tsv)",
            ExportFormat::Markdown => "Markdown (.md)",
            ExportFormat::ZipHtml => "Zipped HTML Archive (.zip)",
            ExportFormat::Epub => "EPUB (.epub)",
            ExportFormat::Native => "Default",
        }
    }

    /// Mime type requested from the export call
    pub fn mime_type(&self) -> &'static str {
        match self {
            ExportFormat::Docx => {
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            }
            ExportFormat::Xlsx => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
            ExportFormat::Pptx => {
                "application/vnd.openxmlformats-officedocument.presentationml.presentation"
            }
            ExportFormat::Odt => "application/vnd.oasis.opendocument.text",
            ExportFormat::Ods => "application/vnd.oasis.opendocument.spreadsheet",
            ExportFormat::Odp => "application/vnd.oasis.opendocument.presentation",
            ExportFormat::Pdf => "application/pdf",
            ExportFormat::Png => "image/png",
            ExportFormat::Jpeg => "image/jpeg",
            ExportFormat::Svg => "image/svg+xml",
            ExportFormat::Txt => "text/plain",
            ExportFormat::Html => "text/html",
            ExportFormat::Csv => "text/csv",
            ExportFormat::Tsv => "text/tab-separated-values",
            ExportFormat::Markdown => "text/markdown",
            ExportFormat::ZipHtml => "application/zip",
            ExportFormat::Epub => "application/epub+zip",
            ExportFormat::Native => "application/vnd.google-apps.unknown",
        }
    }

    /// File extension including the leading dot; empty for [`ExportFormat::Native`]
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Docx => ".docx",
            ExportFormat::Xlsx => ".xlsx",
            ExportFormat::Pptx => ".pptx",
            ExportFormat::Odt => ".odt",
            ExportFormat::Ods => ".ods",
            ExportFormat::Odp => ".odp",
            ExportFormat::Pdf => ".pdf",
            ExportFormat::Png => ".png",
            ExportFormat::Jpeg => ".jpg",
            ExportFormat::Svg => ".svg",
            ExportFormat::Txt => ".txt",
            ExportFormat::Html => ".html",
            ExportFormat::Csv => ".csv",
            ExportFormat::Tsv => ".tsv",
            ExportFormat::Markdown => ".md",
            ExportFormat::ZipHtml => ".zip",
            ExportFormat::Epub => ".epub",
            ExportFormat::Native => "",
        }
    }

    /// Short format name used by per-part export endpoints (e.g. "csv", "png")
    pub fn short_mime(&self) -> &'static str {
        match self {
            ExportFormat::Png => "png",
            ExportFormat::Jpeg => "jpeg",
            ExportFormat::Svg => "svg",
            ExportFormat::Csv => "csv",
            ExportFormat::Tsv => "tsv",
            other => other.mime_type(),
        }
    }

    /// Flat formats that cannot hold a composite document's sub-parts in one file
    pub fn is_primitive(&self) -> bool {
        matches!(
            self,
            ExportFormat::Csv
                | ExportFormat::Tsv
                | ExportFormat::Png
                | ExportFormat::Jpeg
                | ExportFormat::Svg
        )
    }

    /// Find a format by its user-facing label (case-insensitive)
    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|format| format.label().eq_ignore_ascii_case(label))
    }

    /// Whether `kind` can be exported into this format
    pub fn is_offered_for(&self, kind: NativeKind) -> bool {
        kind.formats().contains(self)
    }
}

/// Extension (with leading dot) for a mime type, if the catalogue knows it
pub fn extension_for_mime(mime_type: &str) -> Option<&'static str> {
    ExportFormat::ALL
        .into_iter()
        .find(|format| format.mime_type().eq_ignore_ascii_case(mime_type))
        .map(|format| format.extension())
        .filter(|ext| !ext.is_empty())
}
