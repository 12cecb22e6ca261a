use core::fmt;
use core::result;

#[derive(Debug)]
pub enum Error {
    Io(::std::io::Error),
    Scroll(scroll::Error),
    Elf(goblin::error::Error),
    BadMagic([u8; 6]),
    Malformed(String),
    UnresolvedExternals(Vec<String>),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Error::Io(ref err) => write!(f, "{}", err),
            Error::Scroll(ref err) => write!(f, "{}", err),
            Error::Elf(ref err) => write!(f, "{}", err),
            Error::BadMagic(ref magic) => write!(f, "invalid o65 signature: {:02x?}", magic),
            Error::Malformed(ref msg) => write!(f, "malformed o65 image: {}", msg),
            Error::UnresolvedExternals(ref names) => {
                write!(f, "unresolved external symbols: {}", names.join(", "))
            }
        }
    }
}

impl ::std::error::Error for Error {
    fn source(&self) -> Option<&(dyn ::std::error::Error + 'static)> {
        match *self {
            Error::Io(ref err) => Some(err),
            Error::Scroll(ref err) => Some(err),
            Error::Elf(ref err) => Some(err),
            _ => None,
        }
    }
}

impl From<::std::io::Error> for Error {
    fn from(err: ::std::io::Error) -> Error {
        Error::Io(err)
    }
}

impl From<scroll::Error> for Error {
    fn from(err: scroll::Error) -> Error {
        Error::Scroll(err)
    }
}

impl From<goblin::error::Error> for Error {
    fn from(err: goblin::error::Error) -> Error {
        Error::Elf(err)
    }
}

pub type Result<T> = result::Result<T, Error>;
