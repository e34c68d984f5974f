use serde::Serialize;

/// Coarse media classification derived from the file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Folder,
    Image,
    Audio,
    Video,
    Text,
    Document,
    Archive,
    Other,
}

impl MediaType {
    pub fn classify(name: &str, is_folder: bool) -> Self {
        if is_folder {
            return MediaType::Folder;
        }
        let ext = match extension(name) {
            Some(e) => e,
            None => return MediaType::Other,
        };
        match ext.as_str() {
            "jpg" | "jpeg" | "png" | "gif" | "bmp" | "webp" | "svg" | "ico" | "heic" => MediaType::Image,
            "mp3" | "flac" | "wav" | "ogg" | "m4a" | "aac" | "ape" | "wma" => MediaType::Audio,
            "mp4" | "mkv" | "avi" | "mov" | "wmv" | "flv" | "webm" | "m3u8" | "ts" | "rmvb" => MediaType::Video,
            "txt" | "md" | "log" | "json" | "xml" | "yaml" | "yml" | "toml" | "ini" | "csv" | "html" | "css"
            | "js" | "rs" | "go" | "py" | "java" | "c" | "h" | "sh" => MediaType::Text,
            "pdf" | "doc" | "docx" | "xls" | "xlsx" | "ppt" | "pptx" | "odt" | "epub" => MediaType::Document,
            "zip" | "rar" | "7z" | "tar" | "gz" | "bz2" | "xz" | "iso" => MediaType::Archive,
            _ => MediaType::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MediaType::Folder => "folder",
            MediaType::Image => "image",
            MediaType::Audio => "audio",
            MediaType::Video => "video",
            MediaType::Text => "text",
            MediaType::Document => "document",
            MediaType::Archive => "archive",
            MediaType::Other => "other",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "folder" => MediaType::Folder,
            "image" => MediaType::Image,
            "audio" => MediaType::Audio,
            "video" => MediaType::Video,
            "text" => MediaType::Text,
            "document" => MediaType::Document,
            "archive" => MediaType::Archive,
            _ => MediaType::Other,
        }
    }
}

/// Lower-cased extension without the dot. Names like `.bashrc` have none.
pub fn extension(name: &str) -> Option<String> {
    let (stem, ext) = name.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}
