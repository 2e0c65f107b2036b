use super::*;

pub(crate) enum ServerError {
    Generation(GenerateError),
}

pub(crate) type ServerResult<T> = Result<T, ServerError>;

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        match self {
            Self::Generation(error) => {
                error!("error generating page: {error}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    format!("<h1>Error</h1><pre>{error}</pre>"),
                )
                    .into_response()
            }
        }
    }
}

impl From<GenerateError> for ServerError {
    fn from(error: GenerateError) -> Self {
        Self::Generation(error)
    }
}
