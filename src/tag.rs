use crate::exif::FieldType;

// NB: woefully incomplete, add here as needed

pub const EXIF_IFD_POINTER: u16 = 0x8769;
pub const GPS_INFO_IFD_POINTER: u16 = 0x8825;
pub const INTEROPERABILITY_IFD_POINTER: u16 = 0xa005;
pub const JPEG_THUMBNAIL_LENGTH: u16 = 0x0202;
pub const JPEG_THUMBNAIL_OFFSET: u16 = 0x0201;

pub const IMAGE_WIDTH: u16 = 0x0100;
pub const IMAGE_LENGTH: u16 = 0x0101;
pub const IMG_DESCRIPTION: u16 = 0x010e;
pub const MAKE: u16 = 0x010f;
pub const MODEL: u16 = 0x0110;
pub const ORIENTATION: u16 = 0x0112;
pub const X_RESOLUTION: u16 = 0x011a;
pub const Y_RESOLUTION: u16 = 0x011b;
pub const SOFTWARE: u16 = 0x0131;
pub const MODIFY_DATE: u16 = 0x0132;
pub const XMP: u16 = 0x02bc;

pub const MAKER_NOTE: u16 = 0x927c;
pub const USER_COMMENT: u16 = 0x9286;

pub mod gps {
    pub const LATITUDE_REF: u16 = 0x0001;
    pub const LATITUDE: u16 = 0x0002;
    pub const LONGITUDE_REF: u16 = 0x0003;
    pub const LONGITUDE: u16 = 0x0004;
    pub const ALTITUDE_REF: u16 = 0x0005;
    pub const ALTITUDE: u16 = 0x0006;
}

/// tags whose value is the offset of a child directory
pub fn is_subifd_pointer(tag: u16) -> bool {
    matches!(tag, EXIF_IFD_POINTER | GPS_INFO_IFD_POINTER | INTEROPERABILITY_IFD_POINTER)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TagInfo {
    pub name: &'static str,
    pub default_type: FieldType,
}

/// Name/type lookup for a metadata dictionary. Only used for display,
/// never for layout.
pub trait TagDictionary {
    fn lookup(&self, tag: u16) -> Option<TagInfo>;
}

/// the handful of baseline tiff/exif tags defined above
#[derive(Clone, Copy, Debug, Default)]
pub struct BaselineTags;

impl TagDictionary for BaselineTags {
    fn lookup(&self, tag: u16) -> Option<TagInfo> {
        use crate::exif::FieldType::*;
        let (name, default_type) = match tag {
            IMAGE_WIDTH => ("ImageWidth", Long),
            IMAGE_LENGTH => ("ImageLength", Long),
            IMG_DESCRIPTION => ("ImageDescription", Ascii),
            MAKE => ("Make", Ascii),
            MODEL => ("Model", Ascii),
            ORIENTATION => ("Orientation", Short),
            X_RESOLUTION => ("XResolution", Rational),
            Y_RESOLUTION => ("YResolution", Rational),
            SOFTWARE => ("Software", Ascii),
            MODIFY_DATE => ("ModifyDate", Ascii),
            XMP => ("XMP", Byte),
            JPEG_THUMBNAIL_OFFSET => ("JPEGInterchangeFormat", Long),
            JPEG_THUMBNAIL_LENGTH => ("JPEGInterchangeFormatLength", Long),
            EXIF_IFD_POINTER => ("ExifIFDPointer", Long),
            GPS_INFO_IFD_POINTER => ("GPSInfoIFDPointer", Long),
            INTEROPERABILITY_IFD_POINTER => ("InteroperabilityIFDPointer", Long),
            MAKER_NOTE => ("MakerNote", MakerNote),
            USER_COMMENT => ("UserComment", Undefined),
            _ => return None,
        };
        Some(TagInfo { name, default_type })
    }
}
