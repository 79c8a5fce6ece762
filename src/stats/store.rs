use crate::stats::{Error, Result, STATS_PIECE_SIZE};
use bit_vec::BitVec;

/// The alias type used to identify piece indexes.
pub type PieceIndex = usize;

/// The piece store owns the stats blob buffer and tracks which pieces have been received.
/// The declared size of the blob is set at most once for the lifetime of the store.
#[derive(Debug, Clone, PartialEq)]
pub struct PieceStore {
    declared_size: Option<usize>,
    buffer: Vec<u8>,
    completed_pieces: BitVec,
}

impl PieceStore {
    pub fn new() -> Self {
        Self {
            declared_size: None,
            buffer: Vec::new(),
            completed_pieces: BitVec::new(),
        }
    }

    /// Declare the total size of the stats blob and allocate the backing buffer.
    ///
    /// # Returns
    ///
    /// Returns an error when the size is invalid or a size has already been declared.
    pub fn declare(&mut self, size: usize) -> Result<()> {
        if self.declared_size.is_some() {
            return Err(Error::AlreadyDeclared);
        }
        if size == 0 {
            return Err(Error::InvalidSize(size));
        }

        self.declared_size = Some(size);
        self.buffer = vec![0; size];
        self.completed_pieces = BitVec::from_elem(self.piece_count(), false);
        Ok(())
    }

    /// Get the declared size of the stats blob.
    pub fn declared_size(&self) -> Option<usize> {
        self.declared_size
    }

    /// Check if the size of the stats blob is known.
    pub fn is_declared(&self) -> bool {
        self.declared_size.is_some()
    }

    /// Get the total number of pieces of the stats blob.
    /// This returns 0 as long as no size has been declared.
    pub fn piece_count(&self) -> usize {
        // always round up so the last, possibly short, piece is included
        self.declared_size
            .map(|size| (size + STATS_PIECE_SIZE - 1) / STATS_PIECE_SIZE)
            .unwrap_or(0)
    }

    /// Write the given piece bytes into the backing buffer and mark the piece as completed.
    /// Writing the same piece again with identical bytes leaves the store unchanged.
    pub fn write(&mut self, piece: PieceIndex, data: &[u8]) -> Result<()> {
        if piece >= self.piece_count() {
            return Err(Error::OutOfRange(piece));
        }
        if data.len() > STATS_PIECE_SIZE {
            return Err(Error::OversizedPiece(data.len()));
        }

        let start = piece * STATS_PIECE_SIZE;
        let end = (start + data.len()).min(self.buffer.len());
        self.buffer[start..end].copy_from_slice(&data[..end - start]);
        self.completed_pieces.set(piece, true);
        Ok(())
    }

    /// Read the bytes of the given piece from the backing buffer.
    /// The last piece might be smaller than [STATS_PIECE_SIZE].
    pub fn read(&self, piece: PieceIndex) -> Result<&[u8]> {
        if piece >= self.piece_count() {
            return Err(Error::OutOfRange(piece));
        }

        let start = piece * STATS_PIECE_SIZE;
        let end = (start + STATS_PIECE_SIZE).min(self.buffer.len());
        Ok(&self.buffer[start..end])
    }

    /// Get the assembled stats blob bytes.
    pub fn bytes(&self) -> &[u8] {
        &self.buffer
    }

    /// Check if all pieces of the stats blob have been received.
    pub fn is_complete(&self) -> bool {
        self.is_declared() && self.completed_pieces.all()
    }

    /// Get the pieces that have not been completed yet.
    pub fn missing_pieces(&self) -> Vec<PieceIndex> {
        self.completed_pieces
            .iter()
            .enumerate()
            .filter(|(_, completed)| !*completed)
            .map(|(piece, _)| piece)
            .collect()
    }

    /// Clear the received data while keeping the declared size.
    pub fn reset(&mut self) {
        self.buffer.fill(0);
        self.completed_pieces = BitVec::from_elem(self.piece_count(), false);
    }
}
