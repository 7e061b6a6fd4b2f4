// HTTP status descriptors used by the response translation pipeline.
// Carried as plain code + canonical reason so transports that have no
// native status channel can tuck the code inside their payload.

/// An HTTP-like status descriptor: numeric code plus canonical reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpStatus {
    pub code: u16,
    pub reason: &'static str,
}

impl HttpStatus {
    pub const OK: HttpStatus = HttpStatus { code: 200, reason: "OK" };
    pub const CREATED: HttpStatus = HttpStatus { code: 201, reason: "Created" };
    pub const NO_CONTENT: HttpStatus = HttpStatus { code: 204, reason: "No Content" };
    pub const BAD_REQUEST: HttpStatus = HttpStatus { code: 400, reason: "Bad Request" };
    pub const UNAUTHORIZED: HttpStatus = HttpStatus { code: 401, reason: "Unauthorized" };
    pub const FORBIDDEN: HttpStatus = HttpStatus { code: 403, reason: "Forbidden" };
    pub const NOT_FOUND: HttpStatus = HttpStatus { code: 404, reason: "Not Found" };
    pub const CONFLICT: HttpStatus = HttpStatus { code: 409, reason: "Conflict" };
    pub const UNPROCESSABLE_ENTITY: HttpStatus = HttpStatus { code: 422, reason: "Unprocessable Entity" };
    pub const INTERNAL_SERVER_ERROR: HttpStatus = HttpStatus { code: 500, reason: "Internal Server Error" };
    pub const NOT_IMPLEMENTED: HttpStatus = HttpStatus { code: 501, reason: "Not Implemented" };
    pub const SERVICE_UNAVAILABLE: HttpStatus = HttpStatus { code: 503, reason: "Service Unavailable" };

    /// Look up a known status by numeric code.
    pub fn from_code(code: u16) -> Option<HttpStatus> {
        const KNOWN: &[HttpStatus] = &[
            HttpStatus::OK,
            HttpStatus::CREATED,
            HttpStatus::NO_CONTENT,
            HttpStatus::BAD_REQUEST,
            HttpStatus::UNAUTHORIZED,
            HttpStatus::FORBIDDEN,
            HttpStatus::NOT_FOUND,
            HttpStatus::CONFLICT,
            HttpStatus::UNPROCESSABLE_ENTITY,
            HttpStatus::INTERNAL_SERVER_ERROR,
            HttpStatus::NOT_IMPLEMENTED,
            HttpStatus::SERVICE_UNAVAILABLE,
        ];
        KNOWN.iter().copied().find(|s| s.code == code)
    }

    /// Canonical reason phrase for a code, if it is a known status.
    pub fn reason_for(code: u16) -> Option<&'static str> {
        Self::from_code(code).map(|s| s.reason)
    }
}

impl std::fmt::Display for HttpStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.code, self.reason)
    }
}
